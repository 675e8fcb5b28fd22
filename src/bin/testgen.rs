//! Random workload generator for the index shell. Emits an operation count
//! followed by a stream of `insert`/`delete`/`find` commands, tracking a
//! reference model so inserts never repeat an exact pair and deletes can be
//! steered toward live entries.

use std::collections::{BTreeSet, HashMap};
use std::io::{self, BufWriter, Write};
use std::process::exit;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const KEY_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

struct Config {
    total_ops: usize,
    unique_keys: usize,
    key_len_min: usize,
    key_len_max: usize,
    p_insert: f64,
    p_delete: f64,
    p_find: f64,
    existing_delete_rate: f64,
    seed: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            total_ops: 1000,
            unique_keys: 100,
            key_len_min: 4,
            key_len_max: 12,
            p_insert: 0.45,
            p_delete: 0.25,
            p_find: 0.30,
            existing_delete_rate: 0.7,
            seed: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0),
        }
    }
}

fn usage() {
    eprintln!(
        "Usage: testgen [options]\n\
         \x20 --ops N                Total operations (default 1000)\n\
         \x20 --keys N               Max distinct keys (default 100)\n\
         \x20 --min-len N            Min key length (default 4)\n\
         \x20 --max-len N            Max key length (default 12)\n\
         \x20 --p-insert F           Insert probability (default 0.45)\n\
         \x20 --p-delete F           Delete probability (default 0.25)\n\
         \x20 --p-find F             Find probability (default 0.30)\n\
         \x20 --existing-delete F    Delete hits a live entry with prob F (default 0.7)\n\
         \x20 --seed N               RNG seed (default: time based)\n\
         \x20 -h, --help             Show this help"
    );
}

fn next_value<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<T, String> {
    let value = args.next().ok_or_else(|| format!("{flag} requires a value"))?;
    value.parse().map_err(|_| format!("invalid value for {flag}: {value}"))
}

fn parse_args(cfg: &mut Config) -> Result<(), String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                usage();
                exit(0);
            }
            "--ops" => cfg.total_ops = next_value(&mut args, &arg)?,
            "--keys" => cfg.unique_keys = next_value(&mut args, &arg)?,
            "--min-len" => cfg.key_len_min = next_value(&mut args, &arg)?,
            "--max-len" => cfg.key_len_max = next_value(&mut args, &arg)?,
            "--p-insert" => cfg.p_insert = next_value(&mut args, &arg)?,
            "--p-delete" => cfg.p_delete = next_value(&mut args, &arg)?,
            "--p-find" => cfg.p_find = next_value(&mut args, &arg)?,
            "--existing-delete" => cfg.existing_delete_rate = next_value(&mut args, &arg)?,
            "--seed" => cfg.seed = next_value(&mut args, &arg)?,
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    let sum = cfg.p_insert + cfg.p_delete + cfg.p_find;
    if sum <= 0.0 {
        return Err("probabilities must sum to a positive value".to_string());
    }
    cfg.p_insert /= sum;
    cfg.p_delete /= sum;
    cfg.p_find /= sum;
    cfg.key_len_min = cfg.key_len_min.clamp(1, 64);
    cfg.key_len_max = cfg.key_len_max.clamp(cfg.key_len_min, 64);
    cfg.unique_keys = cfg.unique_keys.max(1);
    cfg.total_ops = cfg.total_ops.max(1);
    cfg.existing_delete_rate = cfg.existing_delete_rate.clamp(0.0, 1.0);
    Ok(())
}

struct Generator {
    cfg: Config,
    rng: StdRng,
    key_pool: Vec<String>,
    state: HashMap<String, BTreeSet<i32>>,
}

impl Generator {
    fn new(cfg: Config) -> Generator {
        let rng = StdRng::seed_from_u64(cfg.seed);
        Generator {
            cfg,
            rng,
            key_pool: Vec::new(),
            state: HashMap::new(),
        }
    }

    fn run(&mut self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{}", self.cfg.total_ops)?;
        for _ in 0..self.cfg.total_ops {
            let p: f64 = self.rng.random();
            if p < self.cfg.p_insert {
                self.emit_insert(out)?;
            } else if p < self.cfg.p_insert + self.cfg.p_delete {
                self.emit_delete(out)?;
            } else {
                self.emit_find(out)?;
            }
        }
        Ok(())
    }

    fn emit_insert(&mut self, out: &mut impl Write) -> io::Result<()> {
        let key = self.pick_or_make_key(true);
        let bucket = self.state.entry(key.clone()).or_default();
        let mut value: i32 = self.rng.random();
        while bucket.contains(&value) {
            value = self.rng.random();
        }
        bucket.insert(value);
        writeln!(out, "insert {key} {value}")
    }

    fn emit_delete(&mut self, out: &mut impl Write) -> io::Result<()> {
        let hit_existing =
            self.rng.random::<f64>() < self.cfg.existing_delete_rate && !self.state.is_empty();
        if hit_existing {
            let key = self.pick_existing_key();
            if let Some(bucket) = self.state.get_mut(&key) {
                let pick = self.rng.random_range(0..bucket.len());
                if let Some(value) = bucket.iter().nth(pick).copied() {
                    bucket.remove(&value);
                    if bucket.is_empty() {
                        self.state.remove(&key);
                    }
                    return writeln!(out, "delete {key} {value}");
                }
            }
        }
        let key = self.pick_or_make_key(false);
        let value: i32 = self.rng.random();
        writeln!(out, "delete {key} {value}")
    }

    fn emit_find(&mut self, out: &mut impl Write) -> io::Result<()> {
        let key = if !self.state.is_empty() && self.rng.random::<f64>() < 0.6 {
            self.pick_existing_key()
        } else {
            self.pick_or_make_key(false)
        };
        writeln!(out, "find {key}")
    }

    fn pick_existing_key(&mut self) -> String {
        let pick = self.rng.random_range(0..self.state.len());
        self.state.keys().nth(pick).cloned().unwrap_or_default()
    }

    fn pick_or_make_key(&mut self, favor_new: bool) -> String {
        let can_make_new = self.key_pool.len() < self.cfg.unique_keys;
        let make_new = favor_new && can_make_new && self.rng.random::<f64>() < 0.65;
        if !make_new && !self.key_pool.is_empty() {
            let pick = self.rng.random_range(0..self.key_pool.len());
            return self.key_pool[pick].clone();
        }
        let key = self.random_key();
        if self.key_pool.len() < self.cfg.unique_keys {
            self.key_pool.push(key.clone());
        }
        key
    }

    fn random_key(&mut self) -> String {
        let len = self
            .rng
            .random_range(self.cfg.key_len_min..=self.cfg.key_len_max);
        (0..len)
            .map(|_| KEY_CHARS[self.rng.random_range(0..KEY_CHARS.len())] as char)
            .collect()
    }
}

fn main() {
    let mut cfg = Config::default();
    if let Err(e) = parse_args(&mut cfg) {
        eprintln!("{e}");
        usage();
        exit(1);
    }
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut generator = Generator::new(cfg);
    if let Err(e) = generator.run(&mut out).and_then(|_| out.flush()) {
        eprintln!("write failed: {e}");
        exit(1);
    }
}
