use thiserror::Error;
use tracing::debug;

use crate::block::{Block, BlockId, Opcode, ParamValue, Parameters};
use crate::chain::{ConnectError, ConnectionRegistry, Proximity};
use crate::event::{LogEvent, LogLevel};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("no block {0} in the workspace")]
    UnknownBlock(BlockId),
    #[error("block {0} is inside a container and cannot be chained")]
    NotTopLevel(BlockId),
    #[error("block {0} is not a container")]
    NotAContainer(BlockId),
    #[error("block {child} cannot be placed inside itself ({container})")]
    NestingCycle { child: BlockId, container: BlockId },
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// The drop area holding a program.
///
/// Top-level blocks are kept in insertion order; blocks placed into a
/// container live in that container's child list instead. Chains between
/// top-level blocks are recorded in the connection registry.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    blocks: Vec<Block>,
    registry: ConnectionRegistry,
    next_id: u32,
    /// Edit notifications the host has not collected yet.
    events: Vec<LogEvent>,
}

impl Workspace {
    pub fn new() -> Self {
        Workspace::default()
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Workspace {
            registry: ConnectionRegistry::with_tolerance(tolerance),
            ..Workspace::default()
        }
    }

    fn allocate(&mut self) -> BlockId {
        self.next_id += 1;
        BlockId::new(self.next_id)
    }

    /// Drop a new block from the palette onto the workspace.
    pub fn add(&mut self, opcode: Opcode, params: Parameters) -> BlockId {
        let id = self.allocate();
        debug!(block = %id, %opcode, "added");
        self.blocks.push(Block::new(id, opcode).with_params(params));
        id
    }

    /// Create a block directly inside `container`, after its current children.
    pub fn add_child(
        &mut self,
        container: BlockId,
        opcode: Opcode,
        params: Parameters,
    ) -> Result<BlockId, WorkspaceError> {
        self.container_mut(container)?;
        let id = self.allocate();
        let parent = self.container_mut(container)?;
        parent.children.push(Block::new(id, opcode).with_params(params));
        Ok(id)
    }

    /// Deep copy of a block with fresh ids, added at the top level unconnected.
    pub fn duplicate(&mut self, id: BlockId) -> Option<BlockId> {
        let mut copy = self.get(id)?.clone();
        self.renumber(&mut copy);
        let new_id = copy.id;
        self.blocks.push(copy);
        Some(new_id)
    }

    fn renumber(&mut self, block: &mut Block) {
        block.id = self.allocate();
        for child in &mut block.children {
            self.renumber(child);
        }
    }

    /// Delete a block, top-level or nested, with everything inside it.
    pub fn remove(&mut self, id: BlockId) -> Option<Block> {
        let removed = match self.blocks.iter().position(|b| b.id == id) {
            Some(pos) => {
                self.registry.detach(id);
                self.blocks.remove(pos)
            }
            None => self
                .blocks
                .iter_mut()
                .find_map(|block| block.take_descendant(id))?,
        };
        self.notify(
            LogLevel::Warning,
            format!("deleted: {}", removed.opcode.description()),
        );
        Some(removed)
    }

    pub fn set_param(
        &mut self,
        id: BlockId,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), WorkspaceError> {
        let block = self.get_mut(id).ok_or(WorkspaceError::UnknownBlock(id))?;
        block.params.set(name, value);
        Ok(())
    }

    /// Move a top-level block into a container, after its current children.
    /// Any chain edges of the moved block are dropped.
    pub fn nest(&mut self, child: BlockId, container: BlockId) -> Result<(), WorkspaceError> {
        let pos = self.top_level_position(child)?;
        if self.blocks[pos].find(container).is_some() {
            return Err(WorkspaceError::NestingCycle { child, container });
        }
        self.container_mut(container)?;

        self.registry.detach(child);
        let block = self.blocks.remove(pos);
        let parent = self.container_mut(container)?;
        parent.children.push(block);
        debug!(block = %child, %container, "nested");
        Ok(())
    }

    /// Chain `to` after `from` if the host reports they are close enough.
    /// Returns whether an edge was recorded.
    pub fn connect(
        &mut self,
        from: BlockId,
        to: BlockId,
        proximity: Proximity,
    ) -> Result<bool, WorkspaceError> {
        self.top_level_position(from)?;
        self.top_level_position(to)?;
        if !self.registry.can_connect(proximity) {
            debug!(%from, %to, ?proximity, "too far apart to connect");
            return Ok(false);
        }
        self.registry.connect(from, to)?;
        let message = format!("connected: {} -> {}", self.describe(from), self.describe(to));
        self.notify(LogLevel::Connection, message);
        Ok(true)
    }

    pub fn disconnect(&mut self, id: BlockId) -> Option<BlockId> {
        let next = self.registry.disconnect(id)?;
        let message = format!("disconnected: {} -> {}", self.describe(id), self.describe(next));
        self.notify(LogLevel::Warning, message);
        Some(next)
    }

    /// Hand over the log lines produced by edits since the last call.
    pub fn take_events(&mut self) -> Vec<LogEvent> {
        std::mem::take(&mut self.events)
    }

    fn notify(&mut self, level: LogLevel, message: String) {
        self.events.push(LogEvent::new(level, message));
    }

    fn describe(&self, id: BlockId) -> &'static str {
        self.get(id)
            .map(|b| b.opcode.description())
            .unwrap_or("unknown block")
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find_map(|b| b.find(id))
    }

    fn get_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.iter_mut().find_map(|b| b.find_mut(id))
    }

    fn container_mut(&mut self, id: BlockId) -> Result<&mut Block, WorkspaceError> {
        let block = self.get_mut(id).ok_or(WorkspaceError::UnknownBlock(id))?;
        if !block.is_container() {
            return Err(WorkspaceError::NotAContainer(id));
        }
        Ok(block)
    }

    fn top_level_position(&self, id: BlockId) -> Result<usize, WorkspaceError> {
        match self.blocks.iter().position(|b| b.id == id) {
            Some(pos) => Ok(pos),
            None if self.get(id).is_some() => Err(WorkspaceError::NotTopLevel(id)),
            None => Err(WorkspaceError::UnknownBlock(id)),
        }
    }

    /// Top-level blocks in insertion order.
    pub fn top_level(&self) -> &[Block] {
        &self.blocks
    }

    /// Top-level blocks that no other block leads into. Each one starts a chain.
    pub fn entry_points(&self) -> impl Iterator<Item = &Block> {
        self.blocks
            .iter()
            .filter(|b| !self.registry.is_successor(b.id))
    }

    /// The chain starting at `start`, resolved to blocks.
    pub fn chain_from(&self, start: BlockId) -> Vec<&Block> {
        self.registry
            .chain_from(start)
            .into_iter()
            .filter_map(|id| self.blocks.iter().find(|b| b.id == id))
            .collect()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Number of top-level blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of blocks including everything nested in containers.
    pub fn block_count(&self) -> usize {
        self.blocks.iter().map(Block::subtree_len).sum()
    }
}
