// SPDX-License-Identifier: BSD-3-Clause
//! Analysis-facing view of a program: functions, blocks, and instructions,
//! with every operand already classified into the closed [`Value`] domain the
//! points-to analysis tracks. Identity of values and sites is index-based and
//! assigned once during lowering, so it is stable per syntactic occurrence.
//!
//! The model is read-only once built; the analysis never mutates it. Programs
//! come either from [`crate::llvm`] (lowered LLVM bitcode) or from
//! [`ProgramBuilder`] (tests and other front ends).

use std::fmt::Display;

/// Index of a function in [`Program::functions`]. Declarations without a body
/// get an index too, so direct calls to externs resolve like any other.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FuncId(pub u32);

/// Index of a call site, in program order across the whole module.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CallId(pub u32);

/// Index of a phi node, in program order across the whole module.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhiId(pub u32);

/// A parameter slot of one function.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArgId {
    pub func: FuncId,
    pub index: u32,
}

/// The closed value domain of the analysis. Anything that is not a concrete
/// function, a call result, a merge result, or a parameter is [`Value::Opaque`]
/// and is never analyzed.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Value {
    Function(FuncId),
    Call(CallId),
    Phi(PhiId),
    Argument(ArgId),
    Opaque,
}

/// The callee operand of a call site.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Callee {
    /// Statically known target.
    Direct(FuncId),
    /// Dynamic target that needs points-to resolution.
    Indirect(Value),
}

#[derive(Clone, Debug)]
pub struct CallSite {
    /// Display label for diagnostics, e.g. `@main:entry:3`.
    pub label: String,
    pub callee: Callee,
    pub args: Vec<Value>,
    /// Source line from debug metadata, when present.
    pub line: Option<u32>,
    /// Debug/intrinsic pseudo-call (`llvm.dbg.*`); never analyzed or reported.
    pub is_debug: bool,
}

/// One incoming edge of a phi node.
#[derive(Clone, Debug)]
pub struct Incoming {
    /// Predecessor block label; kept for diagnostics and ordering only.
    pub pred: String,
    pub value: Value,
}

#[derive(Clone, Debug)]
pub struct PhiNode {
    /// Display label for diagnostics, e.g. `@main:entry:0`.
    pub label: String,
    pub incoming: Vec<Incoming>,
    /// Whether the merged value's static type is a function pointer.
    pub is_fn_ptr: bool,
}

#[derive(Clone, Debug)]
pub struct Store {
    pub dest: Value,
    pub value: Value,
    /// Whether the destination operand's own static type is a function
    /// pointer. Only such stores (into a parameter's backing storage) are
    /// modeled by the analysis.
    pub dest_is_fn_ptr: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct Ret {
    pub value: Option<Value>,
}

/// Instruction classification. Everything the analysis doesn't look at is
/// [`Inst::Other`].
#[derive(Clone, Debug)]
pub enum Inst {
    Call(CallId),
    Phi(PhiId),
    Store(Store),
    Ret(Ret),
    Other,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub is_fn_ptr: bool,
}

#[derive(Clone, Debug)]
pub struct Block {
    pub name: String,
    pub insts: Vec<Inst>,
}

#[derive(Clone, Debug)]
pub struct Function {
    /// Empty for unnamed functions; the report filters those out.
    pub name: String,
    pub params: Vec<Param>,
    /// Empty for declarations.
    pub blocks: Vec<Block>,
    /// Whether the declared return type is a function pointer.
    pub returns_fn_ptr: bool,
}

/// A whole program. Call sites and phi nodes live in module-level arenas
/// indexed by [`CallId`] / [`PhiId`]; blocks reference them by index. Arena
/// order is program order, since ids are assigned during a single in-order
/// walk.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub(crate) functions: Vec<Function>,
    pub(crate) call_sites: Vec<CallSite>,
    pub(crate) phi_nodes: Vec<PhiNode>,
}

impl Program {
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn call_site(&self, id: CallId) -> &CallSite {
        &self.call_sites[id.0 as usize]
    }

    pub fn phi_node(&self, id: PhiId) -> &PhiNode {
        &self.phi_nodes[id.0 as usize]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    /// Call sites in program order.
    pub fn call_sites(&self) -> impl Iterator<Item = (CallId, &CallSite)> {
        self.call_sites
            .iter()
            .enumerate()
            .map(|(i, c)| (CallId(i as u32), c))
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    /// Human-readable description of a value, for diagnostics.
    pub fn describe(&self, v: Value) -> String {
        match v {
            Value::Function(f) => {
                let name = &self.function(f).name;
                if name.is_empty() {
                    format!("<unnamed function #{}>", f.0)
                } else {
                    format!("@{}", name)
                }
            }
            Value::Call(c) => self.call_site(c).label.clone(),
            Value::Phi(p) => self.phi_node(p).label.clone(),
            Value::Argument(a) => {
                let f = self.function(a.func);
                match f.params.get(a.index as usize) {
                    Some(p) if !p.name.is_empty() => format!("@{}:%{}", f.name, p.name),
                    _ => format!("@{}:arg{}", f.name, a.index),
                }
            }
            Value::Opaque => "<opaque value>".to_string(),
        }
    }
}

/// Incremental [`Program`] construction. Instructions are appended to the
/// function's current (most recently opened) block.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a defined function with one entry block. `params` holds one
    /// is-function-pointer flag per parameter.
    pub fn function(&mut self, name: &str, params: &[bool], returns_fn_ptr: bool) -> FuncId {
        let id = FuncId(self.program.functions.len() as u32);
        self.program.functions.push(Function {
            name: name.to_string(),
            params: params
                .iter()
                .enumerate()
                .map(|(i, &is_fn_ptr)| Param {
                    name: format!("p{}", i),
                    is_fn_ptr,
                })
                .collect(),
            blocks: vec![Block {
                name: "entry".to_string(),
                insts: Vec::new(),
            }],
            returns_fn_ptr,
        });
        id
    }

    /// Add a bodyless declaration (extern).
    pub fn declaration(&mut self, name: &str, params: &[bool], returns_fn_ptr: bool) -> FuncId {
        let id = self.function(name, params, returns_fn_ptr);
        self.program.functions[id.0 as usize].blocks.clear();
        id
    }

    /// Open a new block in `f`; subsequent instructions go there.
    pub fn block(&mut self, f: FuncId, name: &str) {
        self.program.functions[f.0 as usize].blocks.push(Block {
            name: name.to_string(),
            insts: Vec::new(),
        });
    }

    /// The value of parameter `index` of `f`.
    pub fn arg(&self, f: FuncId, index: u32) -> Value {
        Value::Argument(ArgId { func: f, index })
    }

    pub fn call(
        &mut self,
        f: FuncId,
        callee: Callee,
        args: Vec<Value>,
        line: Option<u32>,
    ) -> CallId {
        self.call_inst(f, callee, args, line, false)
    }

    /// A debug/intrinsic pseudo-call; skipped by the analysis and the report.
    pub fn debug_call(
        &mut self,
        f: FuncId,
        callee: Callee,
        args: Vec<Value>,
        line: Option<u32>,
    ) -> CallId {
        self.call_inst(f, callee, args, line, true)
    }

    fn call_inst(
        &mut self,
        f: FuncId,
        callee: Callee,
        args: Vec<Value>,
        line: Option<u32>,
        is_debug: bool,
    ) -> CallId {
        let id = CallId(self.program.call_sites.len() as u32);
        let label = self.inst_label(f);
        self.program.call_sites.push(CallSite {
            label,
            callee,
            args,
            line,
            is_debug,
        });
        self.push_inst(f, Inst::Call(id));
        id
    }

    pub fn phi(&mut self, f: FuncId, is_fn_ptr: bool, incoming: Vec<(&str, Value)>) -> PhiId {
        let id = PhiId(self.program.phi_nodes.len() as u32);
        let label = self.inst_label(f);
        self.program.phi_nodes.push(PhiNode {
            label,
            incoming: incoming
                .into_iter()
                .map(|(pred, value)| Incoming {
                    pred: pred.to_string(),
                    value,
                })
                .collect(),
            is_fn_ptr,
        });
        self.push_inst(f, Inst::Phi(id));
        id
    }

    pub fn store(&mut self, f: FuncId, dest: Value, value: Value, dest_is_fn_ptr: bool) {
        self.push_inst(
            f,
            Inst::Store(Store {
                dest,
                value,
                dest_is_fn_ptr,
            }),
        );
    }

    pub fn ret(&mut self, f: FuncId, value: Option<Value>) {
        self.push_inst(f, Inst::Ret(Ret { value }));
    }

    pub fn finish(self) -> Program {
        self.program
    }

    fn inst_label(&self, f: FuncId) -> String {
        let func = &self.program.functions[f.0 as usize];
        let block = func.blocks.last().expect("function has no open block");
        format!("@{}:{}:{}", func.name, block.name, block.insts.len())
    }

    fn push_inst(&mut self, f: FuncId, inst: Inst) {
        self.program.functions[f.0 as usize]
            .blocks
            .last_mut()
            .expect("function has no open block")
            .insts
            .push(inst);
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Function(id) => write!(f, "function #{}", id.0),
            Value::Call(id) => write!(f, "call site #{}", id.0),
            Value::Phi(id) => write!(f, "phi #{}", id.0),
            Value::Argument(a) => write!(f, "argument {} of function #{}", a.index, a.func.0),
            Value::Opaque => write!(f, "<opaque value>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_ids_in_program_order() {
        let mut b = ProgramBuilder::new();
        let f = b.function("f", &[], false);
        let g = b.function("g", &[true], false);
        let c0 = b.call(f, Callee::Direct(g), vec![Value::Function(f)], Some(1));
        b.block(f, "next");
        let c1 = b.call(f, Callee::Direct(g), vec![Value::Opaque], Some(2));
        let p = b.finish();

        assert_eq!(c0, CallId(0));
        assert_eq!(c1, CallId(1));
        let order: Vec<CallId> = p.call_sites().map(|(id, _)| id).collect();
        assert_eq!(order, vec![c0, c1]);
        assert_eq!(p.call_site(c1).label, "@f:next:0");
    }

    #[test]
    fn describe_names_arguments_after_their_function() {
        let mut b = ProgramBuilder::new();
        let f = b.function("callee", &[true], false);
        let arg = b.arg(f, 0);
        let p = b.finish();
        assert_eq!(p.describe(arg), "@callee:%p0");
    }
}
