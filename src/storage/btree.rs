use std::path::Path;

use log::debug;

use crate::error::{IndexError, IndexResult};
use crate::storage::page::{Entry, Key, NO_PAGE, Page, PageId, PageType, SLOTS};
use crate::storage::pager::{META_ROOT, Pager};

/// Smallest entry count a non-root page may hold.
const MIN_SIZE: usize = SLOTS / 2;

/// Disk-backed B+ tree mapping string keys to integer payloads. Duplicate
/// keys are allowed; the (key, payload) pair is what is unique. Routing keys
/// on internal pages are replicated subtree maxima, not separators: the last
/// entry of an internal page always equals the largest entry below it.
///
/// Single writer, single reader. Two handles mutating the same file corrupt
/// it; nothing here detects or prevents that.
pub struct BPlusTree {
    pager: Pager,
    root: PageId,
}

fn back_of(page: &Page) -> IndexResult<Entry> {
    page.back()
        .copied()
        .ok_or_else(|| IndexError::Corrupt("page has no entries".into()))
}

fn corrupt(msg: String) -> IndexError {
    IndexError::Corrupt(msg)
}

impl BPlusTree {
    /// Open (or create) the index stored at `path`.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<BPlusTree> {
        let mut pager = Pager::open(path)?;
        let root = pager.get_meta(META_ROOT)?;
        Ok(BPlusTree { pager, root })
    }

    pub fn is_empty(&self) -> bool {
        self.root == NO_PAGE
    }

    /// Flush metadata and close the underlying file.
    pub fn close(self) -> IndexResult<()> {
        self.pager.close()
    }

    /// Smallest payload stored under `key`, or `None`.
    pub fn find_one(&mut self, key: &Key) -> IndexResult<Option<i32>> {
        if self.root == NO_PAGE {
            return Ok(None);
        }
        let probe = Entry::new(*key, i32::MIN);
        let (_, leaf) = self.descend(&probe)?;
        let slot = leaf.lower_bound(&probe);
        match leaf.entries.get(slot) {
            Some(e) if e.key == *key => Ok(Some(e.payload)),
            _ => Ok(None),
        }
    }

    /// Every payload stored under `key`, ascending. Runs along the leaf
    /// chain when a key's entries span more than one page.
    pub fn find_all(&mut self, key: &Key) -> IndexResult<Vec<i32>> {
        let mut payloads = Vec::new();
        if self.root == NO_PAGE {
            return Ok(payloads);
        }
        let probe = Entry::new(*key, i32::MIN);
        let (_, mut leaf) = self.descend(&probe)?;
        let mut slot = leaf.lower_bound(&probe);
        loop {
            match leaf.entries.get(slot).copied() {
                Some(e) if e.key == *key => {
                    payloads.push(e.payload);
                    slot += 1;
                }
                Some(_) => break,
                None => {
                    if leaf.right == NO_PAGE {
                        break;
                    }
                    leaf = self.pager.read_page(leaf.right)?;
                    slot = 0;
                }
            }
        }
        Ok(payloads)
    }

    /// Add `(key, payload)`. Inserting a pair that is already present is a
    /// no-op.
    pub fn insert(&mut self, key: Key, payload: i32) -> IndexResult<()> {
        let entry = Entry::new(key, payload);
        if self.root == NO_PAGE {
            let mut leaf = Page::new_leaf();
            leaf.entries.push(entry);
            let id = self.pager.append_page(&leaf)?;
            self.set_root(id)?;
            return Ok(());
        }

        // Descend, rewriting any routing maximum the new entry exceeds. The
        // lower_bound clamp means this can only happen at the last slot.
        let mut id = self.root;
        let mut page = self.pager.read_page(id)?;
        while page.page_type == PageType::Internal {
            let slot = page.lower_bound(&entry);
            if page.entries[slot] < entry {
                page.entries[slot] = entry;
                self.pager.update_page(id, &page)?;
            }
            id = page.children[slot];
            page = self.pager.read_page(id)?;
        }

        let slot = page.lower_bound(&entry);
        match page.entries.get(slot).copied() {
            Some(e) if e == entry => return Ok(()),
            Some(e) if e < entry => page.entries.push(entry),
            _ => page.entries.insert(slot, entry),
        }
        self.pager.update_page(id, &page)?;
        if page.len() == SLOTS {
            self.split(id, page)?;
        }
        Ok(())
    }

    /// Remove `(key, payload)` if present.
    pub fn remove(&mut self, key: Key, payload: i32) -> IndexResult<()> {
        if self.root == NO_PAGE {
            return Ok(());
        }
        let entry = Entry::new(key, payload);
        let (leaf_id, mut leaf) = self.descend(&entry)?;
        let slot = leaf.lower_bound(&entry);
        match leaf.entries.get(slot) {
            Some(e) if *e == entry => {}
            _ => return Ok(()),
        }
        let was_max = slot + 1 == leaf.len();
        leaf.entries.remove(slot);
        self.pager.update_page(leaf_id, &leaf)?;
        if was_max {
            // A leaf only empties when it is the root, and the root has no
            // ancestors whose routing keys could have gone stale.
            if let Some(fresh) = leaf.back().copied() {
                self.repair_routing(leaf.parent, &entry, &fresh)?;
            }
        }
        if leaf.len() < MIN_SIZE {
            self.rebalance(leaf_id, leaf)?;
        }
        Ok(())
    }

    /// Walk the whole tree and verify its structural invariants: strict
    /// in-page ordering, occupancy bounds, routing keys equal to subtree
    /// maxima, parent links, uniform leaf depth, and a complete, ordered,
    /// doubly-linked leaf chain. Returns the first violation found.
    pub fn verify(&mut self) -> IndexResult<()> {
        if self.root == NO_PAGE {
            return Ok(());
        }
        let root = self.pager.read_page(self.root)?;
        if root.parent != NO_PAGE {
            return Err(corrupt(format!("root {} has parent {}", self.root, root.parent)));
        }
        if root.is_empty() {
            return Err(corrupt(format!("root {} is empty", self.root)));
        }
        if root.page_type == PageType::Internal && root.len() < 2 {
            return Err(corrupt(format!("internal root {} was not collapsed", self.root)));
        }
        let mut leaf_depth = None;
        let tree_count = self.verify_subtree(self.root, &root, 0, &mut leaf_depth)?;
        let chain_count = self.verify_leaf_chain()?;
        if tree_count != chain_count {
            return Err(corrupt(format!(
                "tree holds {tree_count} entries but the leaf chain visits {chain_count}"
            )));
        }
        Ok(())
    }

    fn verify_subtree(
        &mut self,
        id: PageId,
        page: &Page,
        depth: usize,
        leaf_depth: &mut Option<usize>,
    ) -> IndexResult<u64> {
        for pair in page.entries.windows(2) {
            if pair[0] >= pair[1] {
                return Err(corrupt(format!("page {id} is not strictly sorted")));
            }
        }
        if id == self.root {
            if page.len() >= SLOTS {
                return Err(corrupt(format!("root {id} holds {} entries", page.len())));
            }
        } else if page.len() < MIN_SIZE || page.len() >= SLOTS {
            return Err(corrupt(format!(
                "page {id} holds {} entries, outside [{MIN_SIZE}, {})",
                page.len(),
                SLOTS
            )));
        }
        match page.page_type {
            PageType::Leaf => {
                if !page.children.is_empty() {
                    return Err(corrupt(format!("leaf {id} has children")));
                }
                match *leaf_depth {
                    None => *leaf_depth = Some(depth),
                    Some(d) if d == depth => {}
                    Some(d) => {
                        return Err(corrupt(format!(
                            "leaf {id} sits at depth {depth}, others at {d}"
                        )));
                    }
                }
                Ok(page.len() as u64)
            }
            PageType::Internal => {
                if page.children.len() != page.len() {
                    return Err(corrupt(format!(
                        "internal {id} has {} children for {} entries",
                        page.children.len(),
                        page.len()
                    )));
                }
                let mut count = 0u64;
                for (i, &child_id) in page.children.iter().enumerate() {
                    let child = self.pager.read_page(child_id)?;
                    if child.parent != id {
                        return Err(corrupt(format!(
                            "page {child_id} points at parent {}, expected {id}",
                            child.parent
                        )));
                    }
                    let child_max = back_of(&child)?;
                    if child_max != page.entries[i] {
                        return Err(corrupt(format!(
                            "routing key {i} of page {id} does not match the maximum of subtree {child_id}"
                        )));
                    }
                    count += self.verify_subtree(child_id, &child, depth + 1, leaf_depth)?;
                }
                Ok(count)
            }
        }
    }

    fn verify_leaf_chain(&mut self) -> IndexResult<u64> {
        let mut id = self.root;
        let mut page = self.pager.read_page(id)?;
        while page.page_type == PageType::Internal {
            id = page.children[0];
            page = self.pager.read_page(id)?;
        }
        if page.left != NO_PAGE {
            return Err(corrupt(format!("leftmost leaf {id} has left sibling {}", page.left)));
        }
        let mut count = 0u64;
        let mut prev_id = NO_PAGE;
        let mut prev_entry: Option<Entry> = None;
        loop {
            if page.left != prev_id {
                return Err(corrupt(format!(
                    "leaf {id} has left sibling {}, expected {prev_id}",
                    page.left
                )));
            }
            for e in &page.entries {
                if let Some(p) = prev_entry {
                    if p >= *e {
                        return Err(corrupt(format!("leaf chain not ascending at page {id}")));
                    }
                }
                prev_entry = Some(*e);
                count += 1;
            }
            if page.right == NO_PAGE {
                break;
            }
            prev_id = id;
            id = page.right;
            page = self.pager.read_page(id)?;
        }
        Ok(count)
    }

    /// Walk from the root to the leaf that may hold `probe`.
    fn descend(&mut self, probe: &Entry) -> IndexResult<(PageId, Page)> {
        let mut id = self.root;
        let mut page = self.pager.read_page(id)?;
        while page.page_type == PageType::Internal {
            let slot = page.lower_bound(probe);
            id = page.children[slot];
            page = self.pager.read_page(id)?;
        }
        Ok((id, page))
    }

    fn set_root(&mut self, id: PageId) -> IndexResult<()> {
        self.root = id;
        self.pager.put_meta(META_ROOT, id)
    }

    /// Split a full page into two halves. The original keeps its id and the
    /// lower half; the upper half moves to a freshly appended right sibling.
    /// The parent gains one slot (recursing if that fills it), or a new root
    /// is allocated when the split page was the root.
    fn split(&mut self, page_id: PageId, mut page: Page) -> IndexResult<()> {
        let mut right = Page {
            page_type: page.page_type,
            parent: page.parent,
            left: page_id,
            right: page.right,
            entries: page.entries.split_off(SLOTS / 2),
            children: if page.is_leaf() {
                Vec::new()
            } else {
                page.children.split_off(SLOTS / 2)
            },
        };
        let right_id = self.pager.append_page(&right)?;
        for &child_id in &right.children {
            let mut child = self.pager.read_page(child_id)?;
            child.parent = right_id;
            self.pager.update_page(child_id, &child)?;
        }
        let split_at = back_of(&page)?;
        let max_pair = back_of(&right)?;
        debug!("split page {page_id}, new right sibling {right_id}");

        if page.parent != NO_PAGE {
            let parent_id = page.parent;
            let mut parent = self.pager.read_page(parent_id)?;
            // The slot routing to this page still holds its pre-split
            // maximum, which now belongs to the right half.
            let at = parent.lower_bound(&max_pair);
            parent.entries.insert(at, split_at);
            parent.children.insert(at, page_id);
            parent.children[at + 1] = right_id;
            page.right = right_id;
            if right.right != NO_PAGE {
                let mut successor = self.pager.read_page(right.right)?;
                successor.left = right_id;
                self.pager.update_page(right.right, &successor)?;
            }
            self.pager.update_page(page_id, &page)?;
            self.pager.update_page(parent_id, &parent)?;
            if parent.len() == SLOTS {
                self.split(parent_id, parent)?;
            }
        } else {
            let mut new_root = Page::new_internal();
            new_root.entries = vec![split_at, max_pair];
            new_root.children = vec![page_id, right_id];
            let root_id = self.pager.append_page(&new_root)?;
            page.parent = root_id;
            right.parent = root_id;
            page.right = right_id;
            self.pager.update_page(page_id, &page)?;
            self.pager.update_page(right_id, &right)?;
            self.set_root(root_id)?;
            debug!("tree grew a new root {root_id}");
        }
        Ok(())
    }

    /// After the maximum of a subtree was removed, ancestors may still route
    /// by the removed entry. Replace it with the new maximum at every level
    /// it appears, stopping at the first ancestor whose slot differs.
    fn repair_routing(&mut self, mut id: PageId, stale: &Entry, fresh: &Entry) -> IndexResult<()> {
        while id != NO_PAGE {
            let mut page = self.pager.read_page(id)?;
            let slot = page.lower_bound(stale);
            match page.entries.get(slot).copied() {
                Some(e) if e == *stale => {
                    page.entries[slot] = *fresh;
                    self.pager.update_page(id, &page)?;
                    id = page.parent;
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Bring an underfull page back within bounds: the root shrinks or
    /// empties in place, everything else borrows from a sibling or merges
    /// with one.
    fn rebalance(&mut self, page_id: PageId, page: Page) -> IndexResult<()> {
        if page_id == self.root {
            if page.is_empty() {
                self.set_root(NO_PAGE)?;
                debug!("tree is empty, root cleared");
            } else if page.page_type == PageType::Internal && page.len() == 1 {
                let child_id = page.children[0];
                let mut child = self.pager.read_page(child_id)?;
                child.parent = NO_PAGE;
                self.pager.update_page(child_id, &child)?;
                self.set_root(child_id)?;
                debug!("root collapsed into page {child_id}");
            }
            return Ok(());
        }
        let mut page = page;
        if self.borrow_left(page_id, &mut page)? {
            return Ok(());
        }
        if self.borrow_right(page_id, &mut page)? {
            return Ok(());
        }
        self.merge(page_id, page)
    }

    /// Take the left sibling's largest entry, if it has one to spare. The
    /// parent's routing key for the sibling shrinks to its new maximum; this
    /// page's own routing key is untouched since its maximum is unchanged.
    fn borrow_left(&mut self, page_id: PageId, page: &mut Page) -> IndexResult<bool> {
        let parent_id = page.parent;
        let mut parent = self.pager.read_page(parent_id)?;
        let own_max = back_of(page)?;
        let at = parent.lower_bound(&own_max);
        if at == 0 {
            return Ok(false);
        }
        let sibling_id = parent.children[at - 1];
        let mut sibling = self.pager.read_page(sibling_id)?;
        if sibling.len() <= MIN_SIZE {
            return Ok(false);
        }
        let moved = back_of(&sibling)?;
        sibling.entries.pop();
        page.entries.insert(0, moved);
        if let Some(child_id) = sibling.children.pop() {
            page.children.insert(0, child_id);
            let mut child = self.pager.read_page(child_id)?;
            child.parent = page_id;
            self.pager.update_page(child_id, &child)?;
        }
        parent.entries[at - 1] = back_of(&sibling)?;
        self.pager.update_page(sibling_id, &sibling)?;
        self.pager.update_page(page_id, page)?;
        self.pager.update_page(parent_id, &parent)?;
        debug!("page {page_id} borrowed from left sibling {sibling_id}");
        Ok(true)
    }

    /// Take the right sibling's smallest entry, if it has one to spare. This
    /// page's maximum grows, so its routing key in the parent is rewritten;
    /// the sibling's is untouched.
    fn borrow_right(&mut self, page_id: PageId, page: &mut Page) -> IndexResult<bool> {
        let parent_id = page.parent;
        let mut parent = self.pager.read_page(parent_id)?;
        let own_max = back_of(page)?;
        let at = parent.lower_bound(&own_max);
        if at + 1 >= parent.len() {
            return Ok(false);
        }
        let sibling_id = parent.children[at + 1];
        let mut sibling = self.pager.read_page(sibling_id)?;
        if sibling.len() <= MIN_SIZE {
            return Ok(false);
        }
        let moved = sibling.entries.remove(0);
        page.entries.push(moved);
        if !sibling.children.is_empty() {
            let child_id = sibling.children.remove(0);
            page.children.push(child_id);
            let mut child = self.pager.read_page(child_id)?;
            child.parent = page_id;
            self.pager.update_page(child_id, &child)?;
        }
        parent.entries[at] = back_of(page)?;
        self.pager.update_page(sibling_id, &sibling)?;
        self.pager.update_page(page_id, page)?;
        self.pager.update_page(parent_id, &parent)?;
        debug!("page {page_id} borrowed from right sibling {sibling_id}");
        Ok(true)
    }

    /// Coalesce an underfull page with a sibling; both sides are below or at
    /// the minimum, so the survivor always fits. The absorbed page becomes an
    /// unreachable orphan; its id is never reused. Underflow may cascade into
    /// the parent.
    fn merge(&mut self, page_id: PageId, mut page: Page) -> IndexResult<()> {
        let parent_id = page.parent;
        let mut parent = self.pager.read_page(parent_id)?;
        let own_max = back_of(&page)?;
        let at = parent.lower_bound(&own_max);
        if at > 0 {
            // Fold this page into its left sibling.
            let sibling_id = parent.children[at - 1];
            let mut sibling = self.pager.read_page(sibling_id)?;
            for &child_id in &page.children {
                let mut child = self.pager.read_page(child_id)?;
                child.parent = sibling_id;
                self.pager.update_page(child_id, &child)?;
            }
            sibling.entries.append(&mut page.entries);
            sibling.children.append(&mut page.children);
            sibling.right = page.right;
            if page.right != NO_PAGE {
                let mut successor = self.pager.read_page(page.right)?;
                successor.left = sibling_id;
                self.pager.update_page(page.right, &successor)?;
            }
            parent.entries.remove(at);
            parent.children.remove(at);
            parent.entries[at - 1] = back_of(&sibling)?;
            self.pager.update_page(sibling_id, &sibling)?;
            self.pager.update_page(parent_id, &parent)?;
            debug!("merged page {page_id} into left sibling {sibling_id}");
        } else {
            // Leftmost child: fold the right sibling into this page instead.
            let sibling_id = parent.children[at + 1];
            let mut sibling = self.pager.read_page(sibling_id)?;
            for &child_id in &sibling.children {
                let mut child = self.pager.read_page(child_id)?;
                child.parent = page_id;
                self.pager.update_page(child_id, &child)?;
            }
            page.entries.append(&mut sibling.entries);
            page.children.append(&mut sibling.children);
            page.right = sibling.right;
            if sibling.right != NO_PAGE {
                let mut successor = self.pager.read_page(sibling.right)?;
                successor.left = page_id;
                self.pager.update_page(sibling.right, &successor)?;
            }
            parent.entries.remove(at + 1);
            parent.children.remove(at + 1);
            parent.entries[at] = back_of(&page)?;
            self.pager.update_page(page_id, &page)?;
            self.pager.update_page(parent_id, &parent)?;
            debug!("merged right sibling {sibling_id} into page {page_id}");
        }
        if parent.len() < MIN_SIZE {
            self.rebalance(parent_id, parent)?;
        }
        Ok(())
    }
}
