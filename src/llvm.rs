// SPDX-License-Identifier: BSD-3-Clause
//! Lowering from an [`llvm_ir::Module`] into the analysis-facing
//! [`ir::Program`]. Only the instruction kinds the analysis looks at (calls,
//! phis, stores, returns) are classified; everything else becomes
//! [`ir::Inst::Other`]. Operands are resolved into the closed [`ir::Value`]
//! domain up front so the analysis never inspects LLVM types again.
//!
//! The input module is expected to already be in SSA form with promoted
//! allocas (the usual `opt -passes=mem2reg` pipeline); promotion itself is an
//! external collaborator, not part of this crate.

use std::collections::HashMap;

use either::Either;
use llvm_ir::types::Typed;
use llvm_ir::Name;

use crate::ir::{
    ArgId, Block, CallId, CallSite, Callee, FuncId, Function, Incoming, Inst, Param, PhiId,
    PhiNode, Program, Ret, Store, Value,
};

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, thiserror::Error)]
pub struct Error(pub String);

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Malformed LLVM module: {}", self.0)
    }
}

/// Is this static type a pointer to a function?
fn is_function_pointer(ty: &llvm_ir::Type) -> bool {
    match ty {
        llvm_ir::Type::PointerType { pointee_type, .. } => {
            matches!(**pointee_type, llvm_ir::Type::FuncType { .. })
        }
        _ => false,
    }
}

/// Debug intrinsics are pseudo-calls; they carry metadata, not control flow.
fn is_debug_intrinsic(name: &str) -> bool {
    name.starts_with("llvm.dbg.")
}

fn name_str(n: &Name) -> String {
    match n {
        Name::Name(n) => (**n).clone(),
        Name::Number(n) => n.to_string(),
    }
}

/// Lower a whole module. Definitions and bodyless declarations both become
/// [`ir::Function`]s, so direct calls to externs resolve to a name like any
/// other call.
pub fn lower(m: &llvm_ir::Module) -> Result<Program, Error> {
    Lowering::new(m).run()
}

struct Lowering<'m> {
    m: &'m llvm_ir::Module,
    /// Function name to index; definitions first, then declarations.
    funcs: HashMap<&'m str, u32>,
    /// Function names by index, same order as `funcs`.
    names: Vec<&'m str>,
    program: Program,
}

impl<'m> Lowering<'m> {
    fn new(m: &'m llvm_ir::Module) -> Self {
        let mut funcs = HashMap::with_capacity(m.functions.len() + m.func_declarations.len());
        let mut names = Vec::with_capacity(m.functions.len() + m.func_declarations.len());
        for f in &m.functions {
            funcs.insert(f.name.as_ref(), names.len() as u32);
            names.push(f.name.as_ref());
        }
        for d in &m.func_declarations {
            funcs.insert(d.name.as_ref(), names.len() as u32);
            names.push(d.name.as_ref());
        }
        Lowering {
            m,
            funcs,
            names,
            program: Program::default(),
        }
    }

    fn run(mut self) -> Result<Program, Error> {
        let m = self.m;
        for f in &m.functions {
            let func = self.lower_function(f)?;
            self.program.functions.push(func);
        }
        for d in &m.func_declarations {
            self.program.functions.push(Function {
                name: d.name.clone(),
                params: d
                    .parameters
                    .iter()
                    .map(|p| Param {
                        name: name_str(&p.name),
                        is_fn_ptr: is_function_pointer(&p.ty),
                    })
                    .collect(),
                blocks: Vec::new(),
                returns_fn_ptr: is_function_pointer(&d.return_type),
            });
        }
        Ok(self.program)
    }

    fn func_value(&self, name: &str) -> Option<Value> {
        self.funcs.get(name).map(|&i| Value::Function(FuncId(i)))
    }

    /// Functions are the only constants the analysis tracks; bitcasts of
    /// functions are looked through, everything else is opaque.
    fn constant_value(&self, c: &llvm_ir::ConstantRef) -> Value {
        match c.as_ref() {
            llvm_ir::Constant::GlobalReference { name, .. } => self
                .func_value(name.as_ref())
                .unwrap_or(Value::Opaque),
            llvm_ir::Constant::BitCast(b) => self.constant_value(&b.operand),
            _ => Value::Opaque,
        }
    }

    fn value_of(
        &self,
        locals: &HashMap<&'m Name, Value>,
        op: &llvm_ir::Operand,
    ) -> Result<Value, Error> {
        match op {
            llvm_ir::Operand::LocalOperand { name, .. } => locals
                .get(name)
                .copied()
                .ok_or_else(|| Error(format!("bad local: {}", name))),
            llvm_ir::Operand::ConstantOperand(c) => Ok(self.constant_value(c)),
            llvm_ir::Operand::MetadataOperand => Ok(Value::Opaque),
        }
    }

    fn lower_function(&mut self, f: &'m llvm_ir::Function) -> Result<Function, Error> {
        let fid = FuncId(self.funcs[f.name.as_str()]);

        // First pass: map every result name to a value, assigning call and
        // phi ids in walk order. This has to happen before operands are
        // resolved because phis may reference later definitions.
        let mut locals = HashMap::<&'m Name, Value>::new();
        for (index, p) in f.parameters.iter().enumerate() {
            locals.insert(
                &p.name,
                Value::Argument(ArgId {
                    func: fid,
                    index: index as u32,
                }),
            );
        }
        let mut next_call = self.program.call_sites.len() as u32;
        let mut next_phi = self.program.phi_nodes.len() as u32;
        for b in &f.basic_blocks {
            for i in &b.instrs {
                if let Some(n) = i.try_get_result() {
                    let v = match i {
                        llvm_ir::Instruction::Call(_) => {
                            let v = Value::Call(CallId(next_call));
                            next_call += 1;
                            v
                        }
                        llvm_ir::Instruction::Phi(_) => {
                            let v = Value::Phi(PhiId(next_phi));
                            next_phi += 1;
                            v
                        }
                        _ => Value::Opaque,
                    };
                    locals.insert(n, v);
                } else if matches!(i, llvm_ir::Instruction::Call(_)) {
                    next_call += 1;
                }
            }
            if matches!(&b.term, llvm_ir::Terminator::Invoke(_)) {
                let v = Value::Call(CallId(next_call));
                next_call += 1;
                if let Some(n) = b.term.try_get_result() {
                    locals.insert(n, v);
                }
            }
        }

        // Second pass: build the blocks, pushing call sites and phi nodes
        // into the arenas in the same walk order as the id assignment above.
        let mut blocks = Vec::with_capacity(f.basic_blocks.len());
        for b in &f.basic_blocks {
            let block_name = name_str(&b.name);
            let mut insts = Vec::with_capacity(b.instrs.len() + 1);
            for (idx, i) in b.instrs.iter().enumerate() {
                let label = format!("@{}:{}:{}", f.name, block_name, idx);
                insts.push(self.lower_instruction(&locals, i, label)?);
            }
            insts.push(self.lower_terminator(
                &locals,
                &b.term,
                format!("@{}:{}:{}", f.name, block_name, b.instrs.len()),
            )?);
            blocks.push(Block {
                name: block_name,
                insts,
            });
        }

        Ok(Function {
            name: f.name.clone(),
            params: f
                .parameters
                .iter()
                .map(|p| Param {
                    name: name_str(&p.name),
                    is_fn_ptr: is_function_pointer(&p.ty),
                })
                .collect(),
            blocks,
            returns_fn_ptr: is_function_pointer(&f.return_type),
        })
    }

    fn lower_instruction(
        &mut self,
        locals: &HashMap<&'m Name, Value>,
        i: &'m llvm_ir::Instruction,
        label: String,
    ) -> Result<Inst, Error> {
        Ok(match i {
            llvm_ir::Instruction::Call(call) => {
                let callee = match &call.function {
                    Either::Left(_asm) => Callee::Indirect(Value::Opaque),
                    Either::Right(op) => self.lower_callee(locals, op)?,
                };
                let args = call
                    .arguments
                    .iter()
                    .map(|(op, _)| self.value_of(locals, op))
                    .collect::<Result<Vec<Value>, Error>>()?;
                let line = call.debugloc.as_ref().map(|d| d.line);
                Inst::Call(self.push_call(callee, args, line, label))
            }
            llvm_ir::Instruction::Phi(phi) => {
                let mut incoming = Vec::with_capacity(phi.incoming_values.len());
                for (op, pred) in &phi.incoming_values {
                    incoming.push(Incoming {
                        pred: name_str(pred),
                        value: self.value_of(locals, op)?,
                    });
                }
                let id = PhiId(self.program.phi_nodes.len() as u32);
                self.program.phi_nodes.push(PhiNode {
                    label,
                    incoming,
                    is_fn_ptr: is_function_pointer(&phi.to_type),
                });
                Inst::Phi(id)
            }
            llvm_ir::Instruction::Store(store) => Inst::Store(Store {
                dest: self.value_of(locals, &store.address)?,
                value: self.value_of(locals, &store.value)?,
                dest_is_fn_ptr: is_function_pointer(&store.address.get_type(&self.m.types)),
            }),
            _ => Inst::Other,
        })
    }

    fn lower_terminator(
        &mut self,
        locals: &HashMap<&'m Name, Value>,
        t: &'m llvm_ir::Terminator,
        label: String,
    ) -> Result<Inst, Error> {
        Ok(match t {
            llvm_ir::Terminator::Ret(ret) => Inst::Ret(Ret {
                value: match &ret.return_operand {
                    Some(op) => Some(self.value_of(locals, op)?),
                    None => None,
                },
            }),
            // An invoke is a call with unwind edges the analysis doesn't
            // model; treat it as a call site.
            llvm_ir::Terminator::Invoke(invoke) => {
                let callee = match &invoke.function {
                    Either::Left(_asm) => Callee::Indirect(Value::Opaque),
                    Either::Right(op) => self.lower_callee(locals, op)?,
                };
                let args = invoke
                    .arguments
                    .iter()
                    .map(|(op, _)| self.value_of(locals, op))
                    .collect::<Result<Vec<Value>, Error>>()?;
                let line = invoke.debugloc.as_ref().map(|d| d.line);
                Inst::Call(self.push_call(callee, args, line, label))
            }
            _ => Inst::Other,
        })
    }

    fn lower_callee(
        &self,
        locals: &HashMap<&'m Name, Value>,
        op: &llvm_ir::Operand,
    ) -> Result<Callee, Error> {
        Ok(match self.value_of(locals, op)? {
            Value::Function(f) => Callee::Direct(f),
            v => Callee::Indirect(v),
        })
    }

    fn push_call(
        &mut self,
        callee: Callee,
        args: Vec<Value>,
        line: Option<u32>,
        label: String,
    ) -> CallId {
        let is_debug = match callee {
            Callee::Direct(f) => is_debug_intrinsic(self.names[f.0 as usize]),
            Callee::Indirect(_) => false,
        };
        let id = CallId(self.program.call_sites.len() as u32);
        self.program.call_sites.push(CallSite {
            label,
            callee,
            args,
            line,
            is_debug,
        });
        id
    }
}
