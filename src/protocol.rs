//! The whitespace-token command protocol spoken by the shell: a leading
//! operation count, then `insert <key> <value>`, `find <key>`, and
//! `delete <key> <value>` commands.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Insert { key: String, payload: i32 },
    Find { key: String },
    Delete { key: String, payload: i32 },
}

/// Parse one command from a token stream. Returns `None` once the stream is
/// exhausted. An unrecognized verb consumes only itself, so a lenient caller
/// can skip it and keep going.
pub fn parse_command<'a, I>(tokens: &mut I) -> Option<Result<Command, String>>
where
    I: Iterator<Item = &'a str>,
{
    let verb = tokens.next()?;
    let parsed = match verb {
        "insert" => next_key(tokens, verb).and_then(|key| {
            let payload = next_payload(tokens, verb)?;
            Ok(Command::Insert { key, payload })
        }),
        "find" => next_key(tokens, verb).map(|key| Command::Find { key }),
        "delete" => next_key(tokens, verb).and_then(|key| {
            let payload = next_payload(tokens, verb)?;
            Ok(Command::Delete { key, payload })
        }),
        other => Err(format!("unrecognized command: {other}")),
    };
    Some(parsed)
}

fn next_key<'a>(tokens: &mut impl Iterator<Item = &'a str>, verb: &str) -> Result<String, String> {
    tokens
        .next()
        .map(str::to_string)
        .ok_or_else(|| format!("{verb}: missing key"))
}

fn next_payload<'a>(tokens: &mut impl Iterator<Item = &'a str>, verb: &str) -> Result<i32, String> {
    let token = tokens
        .next()
        .ok_or_else(|| format!("{verb}: missing value"))?;
    token
        .parse()
        .map_err(|_| format!("{verb}: value must be an integer, got '{token}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_three_verbs() {
        let mut tokens = "insert apple 3 find apple delete apple 3".split_whitespace();
        assert_eq!(
            parse_command(&mut tokens),
            Some(Ok(Command::Insert { key: "apple".into(), payload: 3 }))
        );
        assert_eq!(
            parse_command(&mut tokens),
            Some(Ok(Command::Find { key: "apple".into() }))
        );
        assert_eq!(
            parse_command(&mut tokens),
            Some(Ok(Command::Delete { key: "apple".into(), payload: 3 }))
        );
        assert_eq!(parse_command(&mut tokens), None);
    }

    #[test]
    fn negative_payloads_parse() {
        let mut tokens = "insert k -2147483648".split_whitespace();
        assert_eq!(
            parse_command(&mut tokens),
            Some(Ok(Command::Insert { key: "k".into(), payload: i32::MIN }))
        );
    }

    #[test]
    fn unknown_verb_consumes_one_token() {
        let mut tokens = "frobnicate find k".split_whitespace();
        assert!(matches!(parse_command(&mut tokens), Some(Err(_))));
        assert_eq!(
            parse_command(&mut tokens),
            Some(Ok(Command::Find { key: "k".into() }))
        );
    }

    #[test]
    fn truncated_commands_report_what_is_missing() {
        let mut tokens = "insert k".split_whitespace();
        let err = parse_command(&mut tokens).unwrap().unwrap_err();
        assert!(err.contains("missing value"));
        let mut tokens = "delete".split_whitespace();
        let err = parse_command(&mut tokens).unwrap().unwrap_err();
        assert!(err.contains("missing key"));
        let mut tokens = "insert k x".split_whitespace();
        let err = parse_command(&mut tokens).unwrap().unwrap_err();
        assert!(err.contains("integer"));
    }
}
