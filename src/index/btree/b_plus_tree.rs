//! B+Tree operations: search, insert, remove, scans and integrity checks.

use std::marker::PhantomData;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::buffer::{BufferPoolManager, PageReadGuard, PageWriteGuard};
use crate::common::{Error, IndexOptions, PageId, RecordId, Result};
use crate::index::btree::context::{Context, Staged};
use crate::index::btree::iterator::BPlusTreeIter;
use crate::index::btree::IndexKey;
use crate::storage::page::{HeaderPage, InternalPage, LeafPage, Page, TreeNode};

/// How often a page unlinked from the tree is retried while a departing
/// reader still holds its pin.
const FREE_PAGE_RETRIES: usize = 1_000;

/// A named B+Tree of unique keys stored in a buffer pool.
///
/// All operations take `&self`; share the tree between threads with `Arc`.
/// A thread must not call `insert` or `remove` while it holds an iterator
/// over the same tree, since the iterator keeps its current leaf latched.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use crabtree::{BPlusTree, BufferPoolManager, DiskManager, IndexOptions, PageId, RecordId};
///
/// let bpm = Arc::new(BufferPoolManager::new(64, DiskManager::create("index.db")?));
/// let tree = BPlusTree::<i64>::create("orders", bpm.clone(), IndexOptions::new(32, 32))?;
///
/// tree.insert(42, RecordId::new(PageId::new(7), 3))?;
/// assert_eq!(tree.search(&42)?, Some(RecordId::new(PageId::new(7), 3)));
///
/// for entry in tree.range(10..50)? {
///     let (key, rid) = entry?;
///     println!("{key} -> {rid}");
/// }
/// bpm.flush_all_pages()?;
/// # Ok::<(), crabtree::Error>(())
/// ```
pub struct BPlusTree<K: IndexKey> {
    name: String,
    bpm: Arc<BufferPoolManager>,
    options: IndexOptions,
    /// Unlinked pages that could not be deallocated yet.
    unfreed: Mutex<Vec<PageId>>,
    _key: PhantomData<K>,
}

impl<K: IndexKey> BPlusTree<K> {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Register a new, empty index called `name`.
    ///
    /// Formats the root directory first if the database has no pages yet.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if `options` do not fit a page for `K`
    /// - `Error::InvalidIndexName` / `Error::DirectoryFull` from the directory
    /// - `Error::IndexExists` if the name is already registered
    pub fn create(name: &str, bpm: Arc<BufferPoolManager>, options: IndexOptions) -> Result<Self> {
        options.validate::<K>()?;
        {
            let mut header = match bpm.fetch_page_write(PageId::HEADER) {
                Ok(guard) => guard,
                Err(Error::PageNotFound(_)) => {
                    let guard = bpm.new_page()?;
                    if guard.page_id() != PageId::HEADER {
                        return Err(Error::corrupt(
                            PageId::HEADER.0,
                            format!("root directory allocated at {}", guard.page_id()),
                        ));
                    }
                    guard
                }
                Err(e) => return Err(e),
            };

            let mut directory = HeaderPage::decode(&header)?;
            if !directory.insert_record(name, PageId::INVALID)? {
                return Err(Error::IndexExists(name.to_owned()));
            }
            directory.write_to(&mut header);
        }

        debug!(index = name, ?options, "created index");
        Ok(Self::attach(name, bpm, options))
    }

    /// Attach to an index previously registered with [`create`](Self::create).
    ///
    /// `options` only govern nodes created from now on; existing nodes keep
    /// the limits stored in their pages.
    ///
    /// # Errors
    /// `Error::IndexNotFound` if the directory has no record for `name`.
    pub fn open(name: &str, bpm: Arc<BufferPoolManager>, options: IndexOptions) -> Result<Self> {
        options.validate::<K>()?;
        let tree = Self::attach(name, bpm, options);
        let root_page_id = tree.root_page_id()?;
        debug!(index = name, root = %root_page_id, "opened index");
        Ok(tree)
    }

    fn attach(name: &str, bpm: Arc<BufferPoolManager>, options: IndexOptions) -> Self {
        Self {
            name: name.to_owned(),
            bpm,
            options,
            unfreed: Mutex::new(Vec::new()),
            _key: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> IndexOptions {
        self.options
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    /// Current root page, `PageId::INVALID` when the tree is empty.
    pub fn root_page_id(&self) -> Result<PageId> {
        let header = self.bpm.fetch_page_read(PageId::HEADER)?;
        self.read_root(&header)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(!self.root_page_id()?.is_valid())
    }

    /// Unregister the index and free every page of its tree.
    ///
    /// Other handles opened on the same name must not be used afterwards.
    /// Returns the pages that are still allocated because a reader kept them
    /// pinned, including any parked earlier; pass them to
    /// [`BufferPoolManager::delete_page`] once the readers are gone.
    pub fn destroy(self) -> Result<Vec<PageId>> {
        let mut header = self.bpm.fetch_page_write(PageId::HEADER)?;
        let root_page_id = self.read_root(&header)?;

        let mut pages = Vec::new();
        let mut pending = Vec::new();
        if root_page_id.is_valid() {
            pending.push(root_page_id);
        }
        while let Some(page_id) = pending.pop() {
            let node = {
                let guard = self.bpm.fetch_page_read(page_id)?;
                TreeNode::<K>::decode(&guard)?
            };
            if let TreeNode::Internal(internal) = &node {
                pending.extend(internal.children());
            }
            pages.push(page_id);
        }

        let mut directory = HeaderPage::decode(&header)?;
        directory.delete_record(&self.name);
        directory.write_to(&mut header);
        drop(header);

        for &page_id in &pages {
            self.free_page(page_id);
        }
        let unfreed = std::mem::take(&mut *self.unfreed.lock());
        debug!(index = %self.name, pages = pages.len(), unfreed = unfreed.len(), "destroyed index");
        Ok(unfreed)
    }

    // ========================================================================
    // Point lookup
    // ========================================================================

    /// Record stored under `key`, if any.
    pub fn search(&self, key: &K) -> Result<Option<RecordId>> {
        Ok(self
            .find_leaf(Some(key))?
            .and_then(|(_guard, leaf)| leaf.lookup(key)))
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Insert `key -> rid`. Returns `false`, changing nothing, if the key is
    /// already present.
    ///
    /// Pages for every split this insert causes are allocated, and every page
    /// a split touches is latched, before anything is written. An error such
    /// as `Error::NoFreeFrames` leaves the tree as it was.
    pub fn insert(&self, key: K, rid: RecordId) -> Result<bool> {
        let header = self.bpm.fetch_page_write(PageId::HEADER)?;
        let root_page_id = self.read_root(&header)?;
        let mut ctx = Context::new(header, root_page_id);

        if !root_page_id.is_valid() {
            self.start_new_tree(&mut ctx, key, rid)?;
            return Ok(true);
        }

        let mut guard = self.bpm.fetch_page_write(root_page_id)?;
        let mut leaf = loop {
            let node = TreeNode::<K>::decode(&guard)?;
            if node.len() < node.max_size() {
                ctx.release_ancestors();
            }
            match node {
                TreeNode::Leaf(leaf) => break leaf,
                TreeNode::Internal(internal) => {
                    let child = self.bpm.fetch_page_write(internal.lookup(&key))?;
                    ctx.write_set.push(std::mem::replace(&mut guard, child));
                }
            }
        };

        if !leaf.insert(key, rid) {
            return Ok(false);
        }
        if leaf.len() <= leaf.max_size() {
            leaf.write_to(&mut guard);
            return Ok(true);
        }

        let mut reserved = self.reserve_pages(ctx.pages_for_split())?;
        let result = self.split_leaf(&mut ctx, &mut reserved, guard, leaf);
        self.release_reserved(reserved);
        result.map(|()| true)
    }

    fn start_new_tree<'a>(&'a self, ctx: &mut Context<'a>, key: K, rid: RecordId) -> Result<()> {
        let mut directory = HeaderPage::decode(ctx.header_mut()?)?;
        if directory.get_root_id(&self.name).is_none() {
            return Err(Error::IndexNotFound(self.name.clone()));
        }
        let mut guard = self.bpm.new_page()?;
        let root_page_id = guard.page_id();
        directory.update_record(&self.name, root_page_id);

        let mut leaf = LeafPage::new(root_page_id, PageId::INVALID, self.options.leaf_max_size);
        leaf.insert(key, rid);
        leaf.write_to(&mut guard);
        drop(guard);

        ctx.publish_root(&directory, root_page_id);
        debug!(index = %self.name, root = %root_page_id, "started new tree");
        Ok(())
    }

    /// Split an overflowing leaf and every full ancestor above it.
    ///
    /// The whole change is planned on decoded nodes first; pages are written
    /// only once every page it touches is latched.
    fn split_leaf<'a>(
        &'a self,
        ctx: &mut Context<'a>,
        reserved: &mut Vec<PageWriteGuard<'a>>,
        guard: PageWriteGuard<'a>,
        mut leaf: LeafPage<K>,
    ) -> Result<()> {
        let mut staged = Staged::new();
        // Reserved pages this split uses. Their guards stay in `reserved`
        // until the last fallible step, so a failed split frees them.
        let mut fresh = Vec::new();
        staged.hold(guard);

        let sibling_id = take_reserved(reserved, &mut fresh)?;
        let sibling = leaf.split(sibling_id);
        trace!(left = %leaf.page_id(), right = %sibling_id, "split leaf");

        let mut left = leaf.page_id();
        let mut right = sibling_id;
        let mut separator = sibling.key_at(0);
        staged.stage(TreeNode::Leaf(leaf));
        staged.stage(TreeNode::Leaf(sibling));

        // Children of the leaf's parent, left to right.
        let mut leaf_order = Vec::new();
        let new_root = loop {
            let Some(parent_guard) = ctx.write_set.pop() else {
                let root_id = take_reserved(reserved, &mut fresh)?;
                let root =
                    InternalPage::new_root(root_id, self.options.internal_max_size, left, separator, right);
                staged.adopt(left, root_id);
                staged.adopt(right, root_id);
                staged.stage(TreeNode::Internal(root));
                break Some(root_id);
            };

            let mut parent = InternalPage::<K>::decode(&parent_guard)?;
            staged.hold(parent_guard);
            if !parent.insert_after(left, separator, right) {
                return Err(Error::corrupt(
                    parent.page_id().0,
                    format!("split child {} is not linked here", left),
                ));
            }
            if leaf_order.is_empty() {
                leaf_order = parent.children().collect();
            }
            if parent.len() <= parent.max_size() {
                staged.stage(TreeNode::Internal(parent));
                break None;
            }

            let sibling_id = take_reserved(reserved, &mut fresh)?;
            let (promoted, sibling) = parent.split(sibling_id);
            for child in sibling.children() {
                staged.adopt(child, sibling_id);
            }
            trace!(left = %parent.page_id(), right = %sibling_id, "split internal node");

            left = parent.page_id();
            right = sibling_id;
            separator = promoted;
            staged.stage(TreeNode::Internal(parent));
            staged.stage(TreeNode::Internal(sibling));
        };

        let directory = match new_root {
            Some(root_page_id) => Some((self.directory_with_root(ctx, root_page_id)?, root_page_id)),
            None => None,
        };
        self.latch_adopted(&mut staged, &leaf_order)?;
        let (used, spare) = std::mem::take(reserved)
            .into_iter()
            .partition::<Vec<_>, _>(|guard| fresh.contains(&guard.page_id()));
        *reserved = spare;
        for guard in used {
            staged.hold(guard);
        }
        staged.apply()?;

        if let Some((directory, root_page_id)) = directory {
            ctx.publish_root(&directory, root_page_id);
            debug!(index = %self.name, root = %root_page_id, "root split");
        }
        Ok(())
    }

    fn reserve_pages(&self, count: usize) -> Result<Vec<PageWriteGuard<'_>>> {
        let mut pages = Vec::with_capacity(count);
        for _ in 0..count {
            match self.bpm.new_page() {
                Ok(guard) => pages.push(guard),
                Err(e) => {
                    self.release_reserved(pages);
                    return Err(e);
                }
            }
        }
        Ok(pages)
    }

    /// Free reserved pages a split did not use.
    fn release_reserved(&self, pages: Vec<PageWriteGuard<'_>>) {
        let page_ids: Vec<PageId> = pages.iter().map(|guard| guard.page_id()).collect();
        drop(pages);
        for page_id in page_ids {
            self.free_page(page_id);
        }
    }

    /// Latch every page whose parent link changes and that is not latched
    /// yet.
    ///
    /// Leaves are latched left to right, the direction scans move, so a held
    /// leaf to the right of one still wanted is released and latched again
    /// in order. Nothing has been written yet, and other writers only reach
    /// these leaves through their parent, which stays latched.
    fn latch_adopted<'a>(&'a self, staged: &mut Staged<'a, K>, leaf_order: &[PageId]) -> Result<()> {
        let wanted = staged.unlatched_adoptees();
        if wanted.is_empty() {
            return Ok(());
        }

        if let Some(first) = leaf_order.iter().position(|id| wanted.contains(id)) {
            let mut relatch = Vec::new();
            for &page_id in &leaf_order[first..] {
                if wanted.contains(&page_id) {
                    relatch.push(page_id);
                } else if staged.is_held(page_id) {
                    staged.release(page_id);
                    relatch.push(page_id);
                }
            }
            for page_id in relatch {
                staged.hold(self.bpm.fetch_page_write(page_id)?);
            }
        }

        for page_id in wanted {
            if !leaf_order.contains(&page_id) {
                staged.hold(self.bpm.fetch_page_write(page_id)?);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Remove
    // ========================================================================

    /// Remove `key`. Returns `false` if it was not present.
    ///
    /// Every page a merge or borrow touches is latched before anything is
    /// written, so an error leaves the key and the tree as they were.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let header = self.bpm.fetch_page_write(PageId::HEADER)?;
        let root_page_id = self.read_root(&header)?;
        if !root_page_id.is_valid() {
            return Ok(false);
        }
        let mut ctx = Context::new(header, root_page_id);

        let mut guard = self.bpm.fetch_page_write(root_page_id)?;
        let mut leaf = loop {
            let node = TreeNode::<K>::decode(&guard)?;
            if Self::survives_remove(&node, ctx.is_root(guard.page_id())) {
                ctx.release_ancestors();
            }
            match node {
                TreeNode::Leaf(leaf) => break leaf,
                TreeNode::Internal(internal) => {
                    let child = self.bpm.fetch_page_write(internal.lookup(key))?;
                    ctx.write_set.push(std::mem::replace(&mut guard, child));
                }
            }
        };

        if leaf.remove(key).is_none() {
            return Ok(false);
        }
        self.rebalance(&mut ctx, guard, TreeNode::Leaf(leaf))?;
        Ok(true)
    }

    /// A node that can lose one entry without merging or changing the root.
    fn survives_remove(node: &TreeNode<K>, is_root: bool) -> bool {
        match (is_root, node) {
            (true, TreeNode::Leaf(_)) => node.len() > 1,
            (true, TreeNode::Internal(_)) => node.len() > 2,
            (false, _) => node.len() > node.min_size(),
        }
    }

    /// Write back `node` after it lost an entry, borrowing from or merging
    /// with a sibling while it is below minimum, level by level upward.
    ///
    /// Like a split, the change is planned on decoded nodes and written only
    /// once every page it touches is latched.
    fn rebalance<'a>(
        &'a self,
        ctx: &mut Context<'a>,
        guard: PageWriteGuard<'a>,
        mut node: TreeNode<K>,
    ) -> Result<()> {
        let mut staged = Staged::new();
        staged.hold(guard);
        // Leaves under the internal nodes merged or rebalanced, left to right.
        let mut leaf_order = Vec::new();
        // A leaf merged away stays latched until the change is applied.
        let mut merged_leaves = None;
        let mut level = 0usize;

        let new_root = loop {
            let node_id = node.page_id();
            if ctx.is_root(node_id) {
                break Self::shrink_root(&mut staged, node);
            }
            if node.len() >= node.min_size() {
                staged.stage(node);
                break None;
            }

            let parent_guard = ctx.write_set.pop().ok_or_else(|| {
                Error::corrupt(node_id.0, "underflowing node has no latched parent")
            })?;
            let mut parent = InternalPage::<K>::decode(&parent_guard)?;
            staged.hold(parent_guard);
            let index = parent.child_index(node_id).ok_or_else(|| {
                Error::corrupt(parent.page_id().0, format!("{} is not a child", node_id))
            })?;
            if parent.len() < 2 {
                return Err(Error::corrupt(parent.page_id().0, "internal node with one child"));
            }

            let node_is_left = index == 0;
            let sibling_id = if node_is_left {
                parent.child_at(1)
            } else {
                parent.child_at(index - 1)
            };
            let sibling_guard = if !node_is_left && node.is_leaf() {
                // Leaves are latched left to right, the order scans use.
                staged.release(node_id);
                let sibling_guard = self.bpm.fetch_page_write(sibling_id)?;
                staged.hold(self.bpm.fetch_page_write(node_id)?);
                sibling_guard
            } else {
                self.bpm.fetch_page_write(sibling_id)?
            };
            let sibling = TreeNode::<K>::decode(&sibling_guard)?;
            staged.hold(sibling_guard);

            let (separator_index, mut left, mut right) = if node_is_left {
                (1, node, sibling)
            } else {
                (index, sibling, node)
            };
            if level == 1 {
                if let (TreeNode::Internal(l), TreeNode::Internal(r)) = (&left, &right) {
                    leaf_order = l.children().chain(r.children()).collect();
                }
                if let Some((kept, gone)) = merged_leaves {
                    if let Some(pos) = leaf_order.iter().position(|&id| id == kept) {
                        leaf_order.insert(pos + 1, gone);
                    }
                }
            }
            let middle = parent.key_at(separator_index);

            let sibling_can_lend = {
                let sibling = if node_is_left { &right } else { &left };
                sibling.len() > sibling.min_size()
            };
            if sibling_can_lend {
                let (separator, moved) = redistribute(&mut left, &mut right, middle, !node_is_left)?;
                parent.set_key_at(separator_index, separator);
                if let Some(child) = moved {
                    staged.adopt(child, node_id);
                }
                staged.stage(left);
                staged.stage(right);
                staged.stage(TreeNode::Internal(parent));
                trace!(node = %node_id, "borrowed from sibling");
                break None;
            }

            let left_id = left.page_id();
            let right_id = right.page_id();
            let moved = merge(&mut left, right, middle)?;
            parent.remove_at(separator_index);
            for child in moved {
                staged.adopt(child, left_id);
            }
            staged.stage(left);
            staged.unlink(right_id);
            if level == 0 {
                merged_leaves = Some((left_id, right_id));
            }
            trace!(left = %left_id, right = %right_id, "merged siblings");

            node = TreeNode::Internal(parent);
            level += 1;
        };

        let directory = match new_root {
            Some(root_page_id) => Some((self.directory_with_root(ctx, root_page_id)?, root_page_id)),
            None => None,
        };
        self.latch_adopted(&mut staged, &leaf_order)?;
        let unlinked = staged.apply()?;

        if let Some((directory, root_page_id)) = directory {
            ctx.publish_root(&directory, root_page_id);
            debug!(index = %self.name, new_root = %root_page_id, "root collapsed");
        }
        for page_id in unlinked {
            self.free_page(page_id);
        }
        Ok(())
    }

    /// Plan the end of a remove at the root: drop an empty root leaf, or
    /// promote the only child of a root internal node. Returns the new root
    /// if it changes.
    fn shrink_root(staged: &mut Staged<'_, K>, node: TreeNode<K>) -> Option<PageId> {
        let new_root = match &node {
            TreeNode::Leaf(leaf) if leaf.is_empty() => Some(PageId::INVALID),
            TreeNode::Internal(internal) if internal.len() == 1 => Some(internal.child_at(0)),
            _ => None,
        };
        let Some(new_root) = new_root else {
            staged.stage(node);
            return None;
        };
        staged.unlink(node.page_id());
        if new_root.is_valid() {
            staged.adopt(new_root, PageId::INVALID);
        }
        Some(new_root)
    }

    // ========================================================================
    // Scans
    // ========================================================================

    /// Every entry in key order.
    pub fn iter(&self) -> Result<BPlusTreeIter<'_, K>> {
        self.range(..)
    }

    /// Entries with keys `>= key`, in key order.
    pub fn iter_from(&self, key: &K) -> Result<BPlusTreeIter<'_, K>> {
        self.range(*key..)
    }

    /// Entries whose keys fall in `range`, in key order.
    pub fn range<R: RangeBounds<K>>(&self, range: R) -> Result<BPlusTreeIter<'_, K>> {
        let end = range.end_bound().cloned();
        let start = range.start_bound();
        let target = match start {
            Bound::Included(key) | Bound::Excluded(key) => Some(key),
            Bound::Unbounded => None,
        };

        let Some((guard, leaf)) = self.find_leaf(target)? else {
            return Ok(BPlusTreeIter::new(&self.bpm, None, 0, end));
        };
        let index = match start {
            Bound::Included(key) => leaf.lower_bound(key),
            Bound::Excluded(key) => {
                let index = leaf.lower_bound(key);
                if index < leaf.len() && leaf.key_at(index) == *key {
                    index + 1
                } else {
                    index
                }
            }
            Bound::Unbounded => 0,
        };
        Ok(BPlusTreeIter::new(&self.bpm, Some((guard, leaf)), index, end))
    }

    /// Read-crab to the leaf covering `target`, or the leftmost leaf for
    /// `None`. Returns `None` for an empty tree.
    fn find_leaf(&self, target: Option<&K>) -> Result<Option<(PageReadGuard<'_>, LeafPage<K>)>> {
        let header = self.bpm.fetch_page_read(PageId::HEADER)?;
        let root_page_id = self.read_root(&header)?;
        if !root_page_id.is_valid() {
            return Ok(None);
        }
        let mut guard = self.bpm.fetch_page_read(root_page_id)?;
        drop(header);

        loop {
            match TreeNode::<K>::decode(&guard)? {
                TreeNode::Leaf(leaf) => return Ok(Some((guard, leaf))),
                TreeNode::Internal(internal) => {
                    let child = match target {
                        Some(key) => internal.lookup(key),
                        None => internal.child_at(0),
                    };
                    guard = self.bpm.fetch_page_read(child)?;
                }
            }
        }
    }

    // ========================================================================
    // Integrity
    // ========================================================================

    /// Walk the whole tree and verify its structure: node ids and parent
    /// links, fill limits, key order and separator bounds, uniform leaf
    /// depth, and a leaf chain that visits every leaf in key order.
    ///
    /// Meant for a quiescent tree; concurrent writers below the root can
    /// make the walk see a half-finished operation.
    pub fn check_integrity(&self) -> Result<()> {
        let header = self.bpm.fetch_page_read(PageId::HEADER)?;
        let root_page_id = self.read_root(&header)?;
        if !root_page_id.is_valid() {
            return Ok(());
        }

        let mut walk = IntegrityWalk::default();
        self.check_subtree(root_page_id, PageId::INVALID, None, None, 0, &mut walk)?;

        for pair in walk.leaves.windows(2) {
            let (leaf, next) = pair[0];
            if next != pair[1].0 {
                return Err(Error::corrupt(
                    leaf.0,
                    format!("leaf links to {} instead of {}", next, pair[1].0),
                ));
            }
        }
        if let Some(&(leaf, next)) = walk.leaves.last() {
            if next.is_valid() {
                return Err(Error::corrupt(leaf.0, format!("last leaf links to {}", next)));
            }
        }
        Ok(())
    }

    fn check_subtree(
        &self,
        page_id: PageId,
        parent_page_id: PageId,
        lower: Option<K>,
        upper: Option<K>,
        depth: usize,
        walk: &mut IntegrityWalk,
    ) -> Result<()> {
        let node = {
            let guard = self.bpm.fetch_page_read(page_id)?;
            TreeNode::<K>::decode(&guard)?
        };
        if node.page_id() != page_id {
            return Err(Error::corrupt(page_id.0, format!("stores id {}", node.page_id())));
        }
        if node.parent_page_id() != parent_page_id {
            return Err(Error::corrupt(
                page_id.0,
                format!("parent is {}, expected {}", node.parent_page_id(), parent_page_id),
            ));
        }

        let is_root = !parent_page_id.is_valid();
        let min = match (is_root, &node) {
            (true, TreeNode::Leaf(_)) => 1,
            (true, TreeNode::Internal(_)) => 2,
            (false, _) => node.min_size(),
        };
        if node.len() < min || node.len() > node.max_size() {
            return Err(Error::corrupt(
                page_id.0,
                format!("holds {} entries, allowed {}..={}", node.len(), min, node.max_size()),
            ));
        }

        match node {
            TreeNode::Leaf(leaf) => {
                let keys: Vec<K> = leaf.entries().iter().map(|(key, _)| *key).collect();
                check_keys(page_id, &keys, lower, upper)?;
                match walk.leaf_depth {
                    Some(expected) if expected != depth => {
                        return Err(Error::corrupt(
                            page_id.0,
                            format!("leaf at depth {}, others at {}", depth, expected),
                        ));
                    }
                    _ => walk.leaf_depth = Some(depth),
                }
                walk.leaves.push((page_id, leaf.next_page_id()));
            }
            TreeNode::Internal(internal) => {
                let keys: Vec<K> = (1..internal.len()).map(|i| internal.key_at(i)).collect();
                check_keys(page_id, &keys, lower, upper)?;
                for i in 0..internal.len() {
                    let child_lower = if i == 0 { lower } else { Some(internal.key_at(i)) };
                    let child_upper = if i + 1 < internal.len() {
                        Some(internal.key_at(i + 1))
                    } else {
                        upper
                    };
                    self.check_subtree(
                        internal.child_at(i),
                        page_id,
                        child_lower,
                        child_upper,
                        depth + 1,
                        walk,
                    )?;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn read_root(&self, header: &Page) -> Result<PageId> {
        HeaderPage::decode(header)?
            .get_root_id(&self.name)
            .ok_or_else(|| Error::IndexNotFound(self.name.clone()))
    }

    /// The directory with this index's root set to `root_page_id`, ready to
    /// be published once the change that moved the root is applied.
    fn directory_with_root(&self, ctx: &mut Context<'_>, root_page_id: PageId) -> Result<HeaderPage> {
        let mut directory = HeaderPage::decode(ctx.header_mut()?)?;
        if !directory.update_record(&self.name, root_page_id) {
            return Err(Error::IndexNotFound(self.name.clone()));
        }
        Ok(directory)
    }

    /// Deallocate a page no longer reachable from the tree. A reader that
    /// has just released its latch may still hold the pin for a moment.
    /// A page that cannot be freed is parked for [`reclaim_pages`](Self::reclaim_pages).
    fn free_page(&self, page_id: PageId) {
        let mut retries = 0;
        loop {
            match self.bpm.delete_page(page_id) {
                Ok(()) => return,
                Err(Error::PagePinned(_)) if retries < FREE_PAGE_RETRIES => {
                    retries += 1;
                    std::thread::yield_now();
                }
                Err(e) => {
                    warn!(%page_id, error = %e, "unlinked page not freed, parked");
                    break;
                }
            }
        }
        self.unfreed.lock().push(page_id);
    }

    // ========================================================================
    // Unlinked page reclaim
    // ========================================================================

    /// Pages unlinked from the tree that are still allocated, usually
    /// because a reader kept them pinned past every retry.
    pub fn unfreed_pages(&self) -> Vec<PageId> {
        self.unfreed.lock().clone()
    }

    /// Try again to free the parked pages. Returns how many were freed;
    /// pages still pinned stay parked.
    ///
    /// # Errors
    /// The first failure other than `Error::PagePinned`. That page leaves
    /// the list; pages not yet retried stay parked.
    pub fn reclaim_pages(&self) -> Result<usize> {
        let parked = std::mem::take(&mut *self.unfreed.lock());
        let mut kept = Vec::new();
        let mut freed = 0;
        let mut result = Ok(());
        for page_id in parked {
            if result.is_err() {
                kept.push(page_id);
                continue;
            }
            match self.bpm.delete_page(page_id) {
                Ok(()) => freed += 1,
                Err(Error::PagePinned(_)) => kept.push(page_id),
                Err(e) => result = Err(e),
            }
        }
        self.unfreed.lock().extend(kept);
        if freed > 0 {
            debug!(index = %self.name, pages = freed, "reclaimed unlinked pages");
        }
        result.map(|()| freed)
    }
}

impl<K: IndexKey> std::fmt::Debug for BPlusTree<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BPlusTree")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish()
    }
}

#[derive(Default)]
struct IntegrityWalk {
    /// (leaf, next leaf) in tree order.
    leaves: Vec<(PageId, PageId)>,
    leaf_depth: Option<usize>,
}

/// Claim one reserved page not yet claimed by this split.
fn take_reserved(reserved: &[PageWriteGuard<'_>], fresh: &mut Vec<PageId>) -> Result<PageId> {
    let page_id = reserved
        .iter()
        .rev()
        .map(|guard| guard.page_id())
        .find(|page_id| !fresh.contains(page_id))
        .ok_or_else(|| Error::corrupt(PageId::HEADER.0, "split needed more pages than reserved"))?;
    fresh.push(page_id);
    Ok(page_id)
}

/// Keys must be strictly increasing and inside `[lower, upper)`.
fn check_keys<K: IndexKey>(page_id: PageId, keys: &[K], lower: Option<K>, upper: Option<K>) -> Result<()> {
    if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(Error::corrupt(page_id.0, "keys out of order"));
    }
    let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
        return Ok(());
    };
    if lower.is_some_and(|lower| *first < lower) || upper.is_some_and(|upper| *last >= upper) {
        return Err(Error::corrupt(
            page_id.0,
            format!("keys {:?}..={:?} outside bounds {:?}..{:?}", first, last, lower, upper),
        ));
    }
    Ok(())
}

/// Move one entry between adjacent siblings, returning the separator to
/// store between them and, for internal nodes, the child that changed node.
fn redistribute<K: IndexKey>(
    left: &mut TreeNode<K>,
    right: &mut TreeNode<K>,
    middle: K,
    from_left: bool,
) -> Result<(K, Option<PageId>)> {
    let page = left.page_id().0;
    match (left, right) {
        (TreeNode::Leaf(left), TreeNode::Leaf(right)) => {
            let separator = if from_left {
                left.lend_last_to(right)
            } else {
                left.borrow_first_from(right)
            };
            separator
                .map(|separator| (separator, None))
                .ok_or_else(|| Error::corrupt(page, "sibling had nothing to lend"))
        }
        (TreeNode::Internal(left), TreeNode::Internal(right)) => {
            let moved = if from_left {
                left.lend_last_to(middle, right)
            } else {
                left.borrow_first_from(middle, right)
            };
            moved
                .map(|(separator, child)| (separator, Some(child)))
                .ok_or_else(|| Error::corrupt(page, "sibling had nothing to lend"))
        }
        _ => Err(Error::corrupt(page, "siblings on different levels")),
    }
}

/// Fold `right` into `left`, returning the children that now belong to
/// `left`.
fn merge<K: IndexKey>(left: &mut TreeNode<K>, right: TreeNode<K>, middle: K) -> Result<Vec<PageId>> {
    match (left, right) {
        (TreeNode::Leaf(left), TreeNode::Leaf(right)) => {
            left.merge_from(right);
            Ok(Vec::new())
        }
        (TreeNode::Internal(left), TreeNode::Internal(right)) => {
            let moved = right.children().collect();
            left.merge_from(middle, right);
            Ok(moved)
        }
        (left, _) => Err(Error::corrupt(left.page_id().0, "siblings on different levels")),
    }
}
