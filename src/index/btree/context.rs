//! Latches held by a writer on its way down the tree, and the page images
//! a structural change stages before writing any of them.

use crate::buffer::PageWriteGuard;
use crate::common::{Error, PageId, Result};
use crate::index::btree::IndexKey;
use crate::storage::page::{HeaderPage, TreeNode, TreePageHeader};

/// Write latches taken during one insert or remove.
///
/// `header` is the root directory latch, kept only while the root may still
/// change. `write_set` holds the latched ancestors of the node being worked
/// on, topmost first.
pub(crate) struct Context<'a> {
    pub(crate) header: Option<PageWriteGuard<'a>>,
    pub(crate) root_page_id: PageId,
    pub(crate) write_set: Vec<PageWriteGuard<'a>>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(header: PageWriteGuard<'a>, root_page_id: PageId) -> Self {
        Self {
            header: Some(header),
            root_page_id,
            write_set: Vec::new(),
        }
    }

    /// Drop every latch above the current node, top-down.
    pub(crate) fn release_ancestors(&mut self) {
        self.header = None;
        self.write_set.clear();
    }

    pub(crate) fn is_root(&self, page_id: PageId) -> bool {
        page_id == self.root_page_id
    }

    pub(crate) fn header_mut(&mut self) -> Result<&mut PageWriteGuard<'a>> {
        self.header.as_mut().ok_or_else(|| {
            Error::corrupt(PageId::HEADER.0, "root change without the directory latch")
        })
    }

    /// Write the directory image prepared for a root change and remember
    /// the new root. A no-op on the page if the directory latch is gone.
    pub(crate) fn publish_root(&mut self, directory: &HeaderPage, root_page_id: PageId) {
        if let Some(header) = self.header.as_mut() {
            directory.write_to(header);
        }
        self.root_page_id = root_page_id;
    }

    /// Fresh pages an overflowing leaf needs: one per node that splits, plus
    /// a new root if the split reaches it.
    ///
    /// Every latched ancestor is full except the topmost one when the
    /// directory latch was already given up, because that node was safe.
    pub(crate) fn pages_for_split(&self) -> usize {
        if self.header.is_some() {
            self.write_set.len() + 2
        } else {
            self.write_set.len()
        }
    }
}

/// A split or merge planned in memory.
///
/// Nodes are staged as decoded images and parent-link changes as
/// `(child, parent)` pairs; nothing reaches a page until [`apply`](Self::apply),
/// which refuses to start unless every page it would write is latched. A
/// failed fetch while planning therefore leaves the tree as it was.
pub(crate) struct Staged<'a, K: IndexKey> {
    latched: Vec<PageWriteGuard<'a>>,
    nodes: Vec<TreeNode<K>>,
    adopted: Vec<(PageId, PageId)>,
    unlinked: Vec<PageId>,
}

impl<'a, K: IndexKey> Staged<'a, K> {
    pub(crate) fn new() -> Self {
        Self {
            latched: Vec::new(),
            nodes: Vec::new(),
            adopted: Vec::new(),
            unlinked: Vec::new(),
        }
    }

    pub(crate) fn hold(&mut self, guard: PageWriteGuard<'a>) {
        self.latched.push(guard);
    }

    pub(crate) fn is_held(&self, page_id: PageId) -> bool {
        self.latched.iter().any(|guard| guard.page_id() == page_id)
    }

    /// Give up the latch on `page_id`. Its staged image, if any, is kept.
    pub(crate) fn release(&mut self, page_id: PageId) {
        self.latched.retain(|guard| guard.page_id() != page_id);
    }

    /// Stage the final image of a node, replacing an earlier one.
    pub(crate) fn stage(&mut self, mut node: TreeNode<K>) {
        let page_id = node.page_id();
        if let Some(pos) = self.adopted.iter().position(|&(child, _)| child == page_id) {
            let (_, parent) = self.adopted.remove(pos);
            node.set_parent_page_id(parent);
        }
        self.nodes.retain(|staged| staged.page_id() != page_id);
        self.nodes.push(node);
    }

    /// Record that `child` now hangs under `parent`.
    pub(crate) fn adopt(&mut self, child: PageId, parent: PageId) {
        if let Some(node) = self.nodes.iter_mut().find(|node| node.page_id() == child) {
            node.set_parent_page_id(parent);
            return;
        }
        self.adopted.retain(|&(page_id, _)| page_id != child);
        self.adopted.push((child, parent));
    }

    /// Record that `page_id` is no longer part of the tree.
    pub(crate) fn unlink(&mut self, page_id: PageId) {
        self.nodes.retain(|node| node.page_id() != page_id);
        self.adopted.retain(|&(child, _)| child != page_id);
        self.unlinked.push(page_id);
    }

    /// Pages whose parent link changes but which are not latched yet.
    pub(crate) fn unlatched_adoptees(&self) -> Vec<PageId> {
        self.adopted
            .iter()
            .map(|&(child, _)| child)
            .filter(|&child| !self.is_held(child))
            .collect()
    }

    /// Write every staged image and parent link, then drop all latches.
    ///
    /// Returns the unlinked pages, now unlatched and ready to be freed.
    pub(crate) fn apply(mut self) -> Result<Vec<PageId>> {
        let targets = self
            .nodes
            .iter()
            .map(|node| node.page_id())
            .chain(self.adopted.iter().map(|&(child, _)| child));
        for page_id in targets {
            if !self.is_held(page_id) {
                return Err(Error::corrupt(page_id.0, "staged page is not latched"));
            }
        }

        for guard in &mut self.latched {
            let page_id = guard.page_id();
            if let Some(node) = self.nodes.iter().find(|node| node.page_id() == page_id) {
                node.write_to(guard);
            } else if let Some(&(_, parent)) = self.adopted.iter().find(|&&(child, _)| child == page_id) {
                TreePageHeader::set_parent_in_place(guard, parent);
            }
        }
        self.latched.clear();
        Ok(self.unlinked)
    }
}
