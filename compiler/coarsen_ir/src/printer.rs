//! LLVM-flavoured textual listing of functions and modules.

use std::fmt::{self, Write};

use crate::function::Function;
use crate::ir::{BlockId, InstId, InstKind, Type, Value};
use crate::module::{CallingConv, Module};

/// Render one function. Global names are resolved through `module` when given.
pub fn function_to_string(func: &Function, module: Option<&Module>) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_function(&mut out, func, module);
    out
}

fn write_function(out: &mut String, func: &Function, module: Option<&Module>) -> fmt::Result {
    let printer = Printer { func, module };
    let cc = match func.calling_conv {
        CallingConv::C => "",
        CallingConv::PtxKernel => "ptx_kernel ",
        CallingConv::PtxDevice => "ptx_device ",
    };
    let params: Vec<String> = func
        .params
        .iter()
        .map(|p| format!("{} %{}", p.ty, p.name))
        .collect();
    if func.is_declaration() {
        return writeln!(out, "declare {cc}{} @{}({})", func.ret_ty, func.name, params.join(", "));
    }

    writeln!(out, "define {cc}{} @{}({}) {{", func.ret_ty, func.name, params.join(", "))?;
    for (idx, &block) in func.layout().iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        writeln!(out, "{}:", printer.label(block))?;
        for &inst in func.block(block).insts() {
            out.push_str("  ");
            printer.write_inst(out, inst)?;
            out.push('\n');
        }
    }
    out.push_str("}\n");
    Ok(())
}

struct Printer<'a> {
    func: &'a Function,
    module: Option<&'a Module>,
}

impl Printer<'_> {
    fn label(&self, block: BlockId) -> String {
        let name = &self.func.block(block).name;
        if name.is_empty() {
            block.to_string()
        } else {
            name.clone()
        }
    }

    fn value(&self, value: Value) -> String {
        match value {
            Value::Inst(id) => {
                let name = &self.func.inst(id).name;
                if name.is_empty() {
                    format!("%t{}", id.raw())
                } else {
                    format!("%{name}")
                }
            }
            Value::Arg(n) => match self.func.params.get(n as usize) {
                Some(param) => format!("%{}", param.name),
                None => format!("%arg{n}"),
            },
            Value::Const(c) => c.to_string(),
            Value::Global(g) => match self.module.and_then(|m| m.global(g)) {
                Some(global) => format!("@{}", global.name),
                None => format!("@g{}", g.index()),
            },
            Value::Undef => "undef".to_owned(),
        }
    }

    fn typed(&self, value: Value) -> String {
        format!("{} {}", self.func.value_type(value), self.value(value))
    }

    fn write_inst(&self, out: &mut String, id: InstId) -> fmt::Result {
        let inst = self.func.inst(id);
        if inst.ty != Type::Void {
            write!(out, "{} = ", self.value(Value::Inst(id)))?;
        }
        match &inst.kind {
            InstKind::Binary { op, lhs, rhs } => write!(
                out,
                "{} {} {}, {}",
                op.mnemonic(),
                inst.ty,
                self.value(*lhs),
                self.value(*rhs)
            ),
            InstKind::Cmp { pred, lhs, rhs } => write!(
                out,
                "icmp {} {}, {}",
                pred.mnemonic(),
                self.typed(*lhs),
                self.value(*rhs)
            ),
            InstKind::Cast { op, value } => {
                write!(out, "{} {} to {}", op.mnemonic(), self.typed(*value), inst.ty)
            }
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => write!(
                out,
                "select {}, {}, {}",
                self.typed(*cond),
                self.typed(*on_true),
                self.typed(*on_false)
            ),
            InstKind::Phi { incoming } => {
                let arms: Vec<String> = incoming
                    .iter()
                    .map(|(v, b)| format!("[ {}, %{} ]", self.value(*v), self.label(*b)))
                    .collect();
                write!(out, "phi {} {}", inst.ty, arms.join(", "))
            }
            InstKind::Gep { base, index } => write!(
                out,
                "getelementptr {}, {}",
                self.typed(*base),
                self.typed(*index)
            ),
            InstKind::Load { ptr } => write!(out, "load {}, {}", inst.ty, self.typed(*ptr)),
            InstKind::Store { ptr, value } => {
                write!(out, "store {}, {}", self.typed(*value), self.typed(*ptr))
            }
            InstKind::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(|a| self.typed(*a)).collect();
                write!(out, "call {} @{callee}({})", inst.ty, args.join(", "))
            }
            InstKind::Br { target } => write!(out, "br label %{}", self.label(*target)),
            InstKind::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(
                out,
                "br {}, label %{}, label %{}",
                self.typed(*cond),
                self.label(*then_block),
                self.label(*else_block)
            ),
            InstKind::Ret { value: None } => out.write_str("ret void"),
            InstKind::Ret { value: Some(v) } => write!(out, "ret {}", self.typed(*v)),
            InstKind::Unreachable => out.write_str("unreachable"),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&function_to_string(self, None))
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        writeln!(f, "target triple = \"{}\"", self.target_triple)?;
        for global in &self.globals {
            writeln!(
                f,
                "@{} = addrspace({}) global [{} x {}] undef",
                global.name,
                global.address_space.raw(),
                global.len,
                global.ty
            )?;
        }
        for func in &self.functions {
            writeln!(f)?;
            f.write_str(&function_to_string(func, Some(self)))?;
        }
        if !self.annotations.is_empty() {
            writeln!(f)?;
            for ann in &self.annotations {
                writeln!(f, "; annotation @{} !\"{}\" {}", ann.symbol, ann.key, ann.value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
