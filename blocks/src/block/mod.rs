pub mod condition;
pub mod id;
pub mod opcode;
pub mod params;

pub use condition::Condition;
pub use id::BlockId;
pub use opcode::Opcode;
pub use params::{ParamValue, Parameters};

/// A block placed in the workspace.
/// Blocks are the unit of execution; containers own their nested blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub opcode: Opcode,
    /// Values of the block's input slots.
    pub params: Parameters,
    /// Nested blocks, in order. Always empty for non-container opcodes.
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(id: BlockId, opcode: Opcode) -> Self {
        Block {
            id,
            opcode,
            params: Parameters::new(),
            children: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Parameters) -> Self {
        self.params = params;
        self
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }

    pub fn is_container(&self) -> bool {
        self.opcode.is_container()
    }

    /// Find this block or one of its descendants by id.
    pub fn find(&self, id: BlockId) -> Option<&Block> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    pub fn find_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    /// Detach a descendant (never `self`) and hand it back.
    pub fn take_descendant(&mut self, id: BlockId) -> Option<Block> {
        if let Some(pos) = self.children.iter().position(|c| c.id == id) {
            return Some(self.children.remove(pos));
        }
        self.children
            .iter_mut()
            .find_map(|child| child.take_descendant(id))
    }

    /// Number of blocks in this subtree, counting `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Block::subtree_len).sum::<usize>()
    }
}
