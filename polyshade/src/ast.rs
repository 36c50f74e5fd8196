//! Program representation built by the authoring operations and consumed by the writers.
//!
//! Expressions are nodes of an arena owned by the builder and referenced by [`NodeId`]; variables live in a second
//! arena referenced by [`VarId`]. Statements own their nested blocks.

use crate::{
  builtin::BuiltinVar,
  input::VertexSemantic,
  stage::ShaderStage,
  stdlib::Intrinsic,
  swizzle::Swizzle,
  types::TypeHandle,
};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(pub(crate) u32);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VarId(pub(crate) u32);

/// Index of a user function in the function table of its stage.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FunId(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
  Bool(bool),
  I32(i32),
  U32(u32),
  F32(f32),
  F16(f32),
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UnaryOp {
  Neg,
  Not,
  BitNot,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  And,
  Or,
  BitAnd,
  BitOr,
  BitXor,
  Shl,
  Shr,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

impl BinaryOp {
  pub const fn symbol(self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::Rem => "%",
      BinaryOp::And => "&&",
      BinaryOp::Or => "||",
      BinaryOp::BitAnd => "&",
      BinaryOp::BitOr => "|",
      BinaryOp::BitXor => "^",
      BinaryOp::Shl => "<<",
      BinaryOp::Shr => ">>",
      BinaryOp::Eq => "==",
      BinaryOp::Ne => "!=",
      BinaryOp::Lt => "<",
      BinaryOp::Le => "<=",
      BinaryOp::Gt => ">",
      BinaryOp::Ge => ">=",
    }
  }

  pub const fn is_comparison(self) -> bool {
    matches!(
      self,
      BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
    )
  }

  pub const fn is_bitwise(self) -> bool {
    matches!(
      self,
      BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
    )
  }
}

/// Access path memoized per base node, so that repeated accesses yield the same node.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Access {
  Member(u32),
  Swizzle(Swizzle),
  Index(u32),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum NodeKind {
  Literal(Literal),
  Var(VarId),
  Builtin(BuiltinVar),
  Member { base: NodeId, index: u32 },
  Swizzle { base: NodeId, swizzle: Swizzle },
  Index { base: NodeId, index: NodeId },
  Unary { op: UnaryOp, operand: NodeId },
  Binary { op: BinaryOp, lhs: NodeId, rhs: NodeId },

  /// Type constructor or conversion; the constructed type is the type of the node.
  Construct { args: Vec<NodeId> },

  Call { fun: FunId, args: Vec<NodeId> },
  Intrinsic { fun: Intrinsic, args: Vec<NodeId> },
  AddressOf(NodeId),
  Deref(NodeId),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Node {
  pub ty: TypeHandle,
  pub kind: NodeKind,
}

pub(crate) type Block = Vec<Stmt>;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Stmt {
  Declare {
    var: VarId,
    init: Option<NodeId>,
  },

  Assign {
    target: NodeId,
    op: Option<BinaryOp>,
    value: NodeId,
  },

  /// Expression evaluated for its side effects.
  Eval(NodeId),

  If {
    branches: Vec<(NodeId, Block)>,
    otherwise: Option<Block>,
  },

  For {
    counter: VarId,
    start: NodeId,
    end: NodeId,
    body: Block,
  },

  While {
    cond: NodeId,
    body: Block,
  },

  DoWhile {
    body: Block,
    cond: NodeId,
  },

  Block(Block),
  Return(Option<NodeId>),
  Break,
  Continue,
  Discard,
}

/// How a variable was declared.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum VarKind {
  Local,
  Param,
  Constant,
  Uniform { group: u32 },
  Texture { group: u32 },
  Sampler { group: u32 },
  Storage { group: u32, read_only: bool },
  Workgroup,
  Input { location: u32, semantic: Option<VertexSemantic> },
  Output { location: u32 },
}

impl VarKind {
  pub fn group(self) -> Option<u32> {
    match self {
      VarKind::Uniform { group }
      | VarKind::Texture { group }
      | VarKind::Sampler { group }
      | VarKind::Storage { group, .. } => Some(group),
      _ => None,
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Variable {
  pub name: String,
  pub ty: TypeHandle,
  pub kind: VarKind,
  pub stage: ShaderStage,

  /// Initializer of constants.
  pub init: Option<NodeId>,
}

/// Call `f` on every node reachable from `block`, parents before children.
pub(crate) fn visit_block(nodes: &[Node], block: &[Stmt], f: &mut impl FnMut(NodeId)) {
  for stmt in block {
    match stmt {
      Stmt::Declare { init, .. } => {
        if let Some(init) = init {
          visit_node(nodes, *init, f);
        }
      }

      Stmt::Assign { target, value, .. } => {
        visit_node(nodes, *target, f);
        visit_node(nodes, *value, f);
      }

      Stmt::Eval(node) => visit_node(nodes, *node, f),

      Stmt::If { branches, otherwise } => {
        for (cond, body) in branches {
          visit_node(nodes, *cond, f);
          visit_block(nodes, body, f);
        }

        if let Some(body) = otherwise {
          visit_block(nodes, body, f);
        }
      }

      Stmt::For { start, end, body, .. } => {
        visit_node(nodes, *start, f);
        visit_node(nodes, *end, f);
        visit_block(nodes, body, f);
      }

      Stmt::While { cond, body } | Stmt::DoWhile { body, cond } => {
        visit_node(nodes, *cond, f);
        visit_block(nodes, body, f);
      }

      Stmt::Block(body) => visit_block(nodes, body, f),
      Stmt::Return(Some(node)) => visit_node(nodes, *node, f),
      Stmt::Return(None) | Stmt::Break | Stmt::Continue | Stmt::Discard => (),
    }
  }
}

pub(crate) fn visit_node(nodes: &[Node], id: NodeId, f: &mut impl FnMut(NodeId)) {
  f(id);

  match &nodes[id.0 as usize].kind {
    NodeKind::Literal(_) | NodeKind::Var(_) | NodeKind::Builtin(_) => (),

    NodeKind::Member { base, .. } | NodeKind::Swizzle { base, .. } => visit_node(nodes, *base, f),

    NodeKind::Index { base, index } => {
      visit_node(nodes, *base, f);
      visit_node(nodes, *index, f);
    }

    NodeKind::Unary { operand, .. } => visit_node(nodes, *operand, f),

    NodeKind::Binary { lhs, rhs, .. } => {
      visit_node(nodes, *lhs, f);
      visit_node(nodes, *rhs, f);
    }

    NodeKind::Construct { args } | NodeKind::Call { args, .. } | NodeKind::Intrinsic { args, .. } => {
      for arg in args {
        visit_node(nodes, *arg, f);
      }
    }

    NodeKind::AddressOf(inner) | NodeKind::Deref(inner) => visit_node(nodes, *inner, f),
  }
}
