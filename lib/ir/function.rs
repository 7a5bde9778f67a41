//! IR functions, blocks and values.

use crate::error::Error;
use crate::ir::{CallTarget, Constant, GlobalId, Inst, InstKind, Type};
use bitflags::bitflags;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a function in a `Module`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FuncId(pub(crate) u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a basic block in a `Function`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of an instruction in a `Function`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct InstId(pub(crate) u32);

impl InstId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An SSA value in a `Function`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Value(pub(crate) u32);

impl Value {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a `Value` is defined by.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ValueDef {
    /// The i'th function parameter.
    Arg(u32),
    /// An inline constant.
    Const(Constant),
    /// The address of a module global.
    Global { id: GlobalId, name: String },
    /// The result of an instruction.
    Inst(InstId),
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
struct ValueData {
    def: ValueDef,
    ty: Type,
}

bitflags! {
    /// Attributes on a function parameter.
    pub struct ParamAttrs: u32 {
        const NOALIAS = 1;
        const NOCAPTURE = 1 << 1;
    }
}

impl Serialize for ParamAttrs {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for ParamAttrs {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(ParamAttrs::from_bits_truncate(bits))
    }
}

impl Default for ParamAttrs {
    fn default() -> ParamAttrs {
        ParamAttrs::empty()
    }
}

/// A basic block: a named, linear sequence of instructions.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Block {
    name: String,
    insts: Vec<InstId>,
}

impl Block {
    fn new(name: String) -> Block {
        Block {
            name,
            insts: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instruction ids in program order.
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }
}

/// A function in Saker IR.
///
/// The function owns its blocks, instructions and values in flat arenas;
/// everything else refers to them through typed indices. A function with
/// no blocks is a declaration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Function {
    name: String,
    address: Option<u64>,
    params: Vec<Type>,
    param_attrs: Vec<ParamAttrs>,
    ret: Type,
    blocks: Vec<Block>,
    insts: Vec<Inst>,
    values: Vec<ValueData>,
    arg_values: Vec<Value>,
    #[serde(skip)]
    const_cache: FxHashMap<Constant, Value>,
}

impl Function {
    pub fn new<S: Into<String>>(name: S, params: Vec<Type>, ret: Type) -> Function {
        let mut f = Function {
            name: name.into(),
            address: None,
            param_attrs: vec![ParamAttrs::empty(); params.len()],
            params,
            ret,
            blocks: Vec::new(),
            insts: Vec::new(),
            values: Vec::new(),
            arg_values: Vec::new(),
            const_cache: FxHashMap::default(),
        };
        for i in 0..f.params.len() {
            let ty = f.params[i];
            let v = f.new_value(ValueDef::Arg(i as u32), ty);
            f.arg_values.push(v);
        }
        f
    }

    fn new_value(&mut self, def: ValueDef, ty: Type) -> Value {
        let v = Value(self.values.len() as u32);
        self.values.push(ValueData { def, ty });
        v
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Option<u64> {
        self.address
    }

    pub fn set_address(&mut self, address: Option<u64>) {
        self.address = address;
    }

    pub fn params(&self) -> &[Type] {
        &self.params
    }

    pub fn ret_type(&self) -> Type {
        self.ret
    }

    /// The value of the i'th parameter.
    pub fn arg(&self, index: usize) -> Value {
        self.arg_values[index]
    }

    pub fn param_attrs(&self, index: usize) -> ParamAttrs {
        self.param_attrs[index]
    }

    pub fn set_param_attrs(&mut self, index: usize, attrs: ParamAttrs) {
        self.param_attrs[index] = attrs;
    }

    /// True if this function has no body yet.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Append a new, empty basic block.
    pub fn add_block<S: Into<String>>(&mut self, name: S) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(name.into()));
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId(i as u32), b))
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.name() == name)
            .map(|i| BlockId(i as u32))
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()]
    }

    /// Create an instruction and, for non-void result types, its result
    /// value. The instruction is not yet placed in any block.
    pub(crate) fn create_inst(&mut self, kind: InstKind, result_ty: Type) -> (InstId, Option<Value>) {
        let id = InstId(self.insts.len() as u32);
        let result = if result_ty.is_void() {
            None
        } else {
            Some(self.new_value(ValueDef::Inst(id), result_ty))
        };
        self.insts.push(Inst::new(kind, result));
        (id, result)
    }

    /// Place an instruction in a block. `at` of `None` appends.
    pub(crate) fn place_inst(&mut self, block: BlockId, inst: InstId, at: Option<usize>) {
        let insts = &mut self.block_mut(block).insts;
        match at {
            Some(index) => insts.insert(index, inst),
            None => insts.push(inst),
        }
    }

    /// Remove the first `count` instructions from a block. The
    /// instructions stay in the arena but are no longer reachable.
    pub(crate) fn remove_leading_insts(&mut self, block: BlockId, count: usize) {
        self.block_mut(block).insts.drain(..count);
    }

    /// Get the interned value for a constant.
    pub fn constant(&mut self, constant: Constant) -> Value {
        if let Some(v) = self.const_cache.get(&constant) {
            return *v;
        }
        let ty = constant.ty();
        let v = self.new_value(ValueDef::Const(constant), ty);
        self.const_cache.insert(constant, v);
        v
    }

    /// Get a value holding the address of a module global.
    pub fn global_ref<S: Into<String>>(&mut self, id: GlobalId, name: S) -> Value {
        let name = name.into();
        for (i, data) in self.values.iter().enumerate() {
            if let ValueDef::Global { id: gid, .. } = &data.def {
                if *gid == id {
                    return Value(i as u32);
                }
            }
        }
        self.new_value(ValueDef::Global { id, name }, Type::Ptr)
    }

    pub fn value_type(&self, value: Value) -> Type {
        self.values[value.index()].ty
    }

    pub fn value_def(&self, value: Value) -> &ValueDef {
        &self.values[value.index()].def
    }

    /// If `value` is an integer constant, its value.
    pub fn value_as_const_int(&self, value: Value) -> Option<u64> {
        match self.value_def(value) {
            ValueDef::Const(c) => c.value_u64(),
            _ => None,
        }
    }

    /// True if the block's last instruction is a terminator.
    pub fn has_terminator(&self, block: BlockId) -> bool {
        self.block(block)
            .insts()
            .last()
            .map(|id| self.inst(*id).kind().is_terminator())
            .unwrap_or(false)
    }

    /// Check structural and typing invariants.
    pub fn verify(&self) -> Result<(), Error> {
        for (id, block) in self.blocks() {
            if block.is_empty() {
                return Err(Error::Type(format!("block {} is empty", block.name())));
            }
            if !self.has_terminator(id) {
                return Err(Error::Type(format!(
                    "block {} does not end in a terminator",
                    block.name()
                )));
            }
            for inst_id in block.insts() {
                self.verify_inst(*inst_id)?;
            }
        }
        Ok(())
    }

    fn verify_inst(&self, id: InstId) -> Result<(), Error> {
        let same_sort = |lhs: Value, rhs: Value| -> Result<(), Error> {
            if self.value_type(lhs) != self.value_type(rhs) {
                return Err(Error::Type(format!(
                    "operand types differ: {} vs {}",
                    self.value_type(lhs),
                    self.value_type(rhs)
                )));
            }
            Ok(())
        };
        match self.inst(id).kind() {
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => {
                same_sort(*lhs, *rhs)
            }
            InstKind::Select {
                on_true, on_false, ..
            } => same_sort(*on_true, *on_false),
            InstKind::Load { ptr, .. } | InstKind::Store { ptr, .. } => {
                if !self.value_type(*ptr).is_ptr() {
                    return Err(Error::Type("memory access through a non-pointer".into()));
                }
                Ok(())
            }
            InstKind::Br { target } => {
                if target.index() >= self.blocks.len() {
                    return Err(Error::Type("branch to an unknown block".into()));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn fmt_value(&self, value: Value) -> String {
        match self.value_def(value) {
            ValueDef::Arg(i) => format!("%arg{}", i),
            ValueDef::Const(c) => format!("{}", c),
            ValueDef::Global { name, .. } => format!("@{}", name),
            ValueDef::Inst(_) => format!("%v{}", value.0),
        }
    }

    fn fmt_inst(&self, f: &mut fmt::Formatter, id: InstId) -> fmt::Result {
        let inst = self.inst(id);
        if let Some(res) = inst.result() {
            write!(f, "  %v{} = ", res.0)?;
        } else {
            write!(f, "  ")?;
        }
        match inst.kind() {
            InstKind::Binary { op, lhs, rhs } => write!(
                f,
                "{} {} {}, {}",
                op.mnemonic(),
                self.value_type(*lhs),
                self.fmt_value(*lhs),
                self.fmt_value(*rhs)
            ),
            InstKind::Cast { op, value, ty } => write!(
                f,
                "{} {} {} to {}",
                op.mnemonic(),
                self.value_type(*value),
                self.fmt_value(*value),
                ty
            ),
            InstKind::ICmp { pred, lhs, rhs } => write!(
                f,
                "icmp {} {} {}, {}",
                pred.mnemonic(),
                self.value_type(*lhs),
                self.fmt_value(*lhs),
                self.fmt_value(*rhs)
            ),
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => write!(
                f,
                "select {}, {}, {}",
                self.fmt_value(*cond),
                self.fmt_value(*on_true),
                self.fmt_value(*on_false)
            ),
            InstKind::Load {
                ty,
                ptr,
                align,
                volatile,
            } => write!(
                f,
                "load{} {}, {}, align {}",
                if *volatile { " volatile" } else { "" },
                ty,
                self.fmt_value(*ptr),
                align
            ),
            InstKind::Store {
                value,
                ptr,
                align,
                volatile,
            } => write!(
                f,
                "store{} {} {}, {}, align {}",
                if *volatile { " volatile" } else { "" },
                self.value_type(*value),
                self.fmt_value(*value),
                self.fmt_value(*ptr),
                align
            ),
            InstKind::InsertElement {
                vector,
                element,
                index,
            } => write!(
                f,
                "insertelement {} {}, {}, {}",
                self.value_type(*vector),
                self.fmt_value(*vector),
                self.fmt_value(*element),
                self.fmt_value(*index)
            ),
            InstKind::ExtractElement { vector, index } => write!(
                f,
                "extractelement {} {}, {}",
                self.value_type(*vector),
                self.fmt_value(*vector),
                self.fmt_value(*index)
            ),
            InstKind::Alloca { ty } => write!(f, "alloca {}", ty),
            InstKind::FieldAddr { base, field } => {
                write!(f, "fieldaddr {}, {}", self.fmt_value(*base), field)
            }
            InstKind::Call { target, args } => {
                match target {
                    CallTarget::Direct(id) => write!(f, "call fn#{}", id.0)?,
                    CallTarget::Indirect(v) => write!(f, "call {}", self.fmt_value(*v))?,
                }
                write!(f, "(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.fmt_value(*a))?;
                }
                write!(f, ")")
            }
            InstKind::IntrinsicCall { intrinsic, args } => {
                write!(f, "call @{}(", intrinsic.name())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.fmt_value(*a))?;
                }
                write!(f, ")")
            }
            InstKind::Fence { ordering, scope } => {
                write!(f, "fence {:?} {:?}", ordering, scope)
            }
            InstKind::Br { target } => write!(f, "br label %{}", self.block(*target).name()),
            InstKind::Ret => write!(f, "ret void"),
            InstKind::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "define {} @{}(", self.ret, self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} %arg{}", p, i)?;
        }
        if self.is_declaration() {
            return writeln!(f, ")");
        }
        writeln!(f, ") {{")?;
        for (_, block) in self.blocks() {
            writeln!(f, "{}:", block.name())?;
            for inst in block.insts() {
                self.fmt_inst(f, *inst)?;
                writeln!(f)?;
            }
        }
        writeln!(f, "}}")
    }
}
