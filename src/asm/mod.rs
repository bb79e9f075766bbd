//! Assembly for the stack VM: the [`Instruction`] surface and the
//! [`Emitter`] that hands out unique labels.
//!
//! Every instruction prints itself as the exact mnemonic text the VM
//! expects, one per line; labels print as `NAME:` on their own line.

use std::fmt;

use crate::symtab::{Level, SymbolEntry};
use crate::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    PushI(i64),
    PushF(f64),
    PushS(String),
    PushG(i64),
    PushL(i64),
    PushA(String),
    PushN(i64),
    AllocN,
    StoreG(i64),
    StoreL(i64),
    StoreN,
    LoadN,
    Check(i64, i64),
    CharAt,
    StrLen,
    Concat,
    ItoF,
    FtoI,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    FAdd,
    FSub,
    FMul,
    FDiv,
    Equal,
    Not,
    Inf,
    InfEq,
    Sup,
    SupEq,
    FInf,
    FInfEq,
    FSup,
    FSupEq,
    Jump(String),
    Jz(String),
    Call,
    Return,
    Pop(i64),
    Dup(i64),
    Swap,
    Read,
    AtoI,
    AtoF,
    WriteI,
    WriteF,
    WriteS,
    WriteChr,
    Writeln,
    Start,
    Stop,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match self {
            PushI(n) => write!(f, "PUSHI {n}"),
            PushF(x) => write!(f, "PUSHF {}", format_real(*x)),
            PushS(s) => write!(f, "PUSHS \"{}\"", escape_string_literal(s)),
            PushG(k) => write!(f, "PUSHG {k}"),
            PushL(k) => write!(f, "PUSHL {k}"),
            PushA(label) => write!(f, "PUSHA {label}"),
            PushN(k) => write!(f, "PUSHN {k}"),
            AllocN => write!(f, "ALLOCN"),
            StoreG(k) => write!(f, "STOREG {k}"),
            StoreL(k) => write!(f, "STOREL {k}"),
            StoreN => write!(f, "STOREN"),
            LoadN => write!(f, "LOADN"),
            Check(lo, hi) => write!(f, "CHECK {lo}, {hi}"),
            CharAt => write!(f, "CHARAT"),
            StrLen => write!(f, "STRLEN"),
            Concat => write!(f, "CONCAT"),
            ItoF => write!(f, "ITOF"),
            FtoI => write!(f, "FTOI"),
            Add => write!(f, "ADD"),
            Sub => write!(f, "SUB"),
            Mul => write!(f, "MUL"),
            Div => write!(f, "DIV"),
            Mod => write!(f, "MOD"),
            FAdd => write!(f, "FADD"),
            FSub => write!(f, "FSUB"),
            FMul => write!(f, "FMUL"),
            FDiv => write!(f, "FDIV"),
            Equal => write!(f, "EQUAL"),
            Not => write!(f, "NOT"),
            Inf => write!(f, "INF"),
            InfEq => write!(f, "INFEQ"),
            Sup => write!(f, "SUP"),
            SupEq => write!(f, "SUPEQ"),
            FInf => write!(f, "FINF"),
            FInfEq => write!(f, "FINFEQ"),
            FSup => write!(f, "FSUP"),
            FSupEq => write!(f, "FSUPEQ"),
            Jump(label) => write!(f, "JUMP {label}"),
            Jz(label) => write!(f, "JZ {label}"),
            Call => write!(f, "CALL"),
            Return => write!(f, "RETURN"),
            Pop(n) => write!(f, "POP {n}"),
            Dup(n) => write!(f, "DUP {n}"),
            Swap => write!(f, "SWAP"),
            Read => write!(f, "READ"),
            AtoI => write!(f, "ATOI"),
            AtoF => write!(f, "ATOF"),
            WriteI => write!(f, "WRITEI"),
            WriteF => write!(f, "WRITEF"),
            WriteS => write!(f, "WRITES"),
            WriteChr => write!(f, "WRITECHR"),
            Writeln => write!(f, "WRITELN"),
            Start => write!(f, "START"),
            Stop => write!(f, "STOP"),
        }
    }
}

/// Formats a real operand so a whole-valued real still prints its
/// decimal point (`2.0`, not `2`), matching the VM's float literal
/// syntax rather than Rust's default `Display` for whole `f64`s.
fn format_real(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        x.to_string()
    }
}

/// Escapes `\` and `"` for embedding a source string value inside a
/// `PUSHS "..."` operand.
fn escape_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Loads a variable's value onto the stack: `PUSHG`/`PUSHL` by level.
pub fn gen_load_var(entry: &SymbolEntry) -> String {
    match entry {
        SymbolEntry::Var { level, addr, .. } => match level {
            Level::Global => Instruction::PushG(*addr).to_string() + "\n",
            Level::Local => Instruction::PushL(*addr).to_string() + "\n",
        },
        _ => unreachable!("gen_load_var called on a non-variable symbol"),
    }
}

/// Stores the stack top into a variable: `STOREG`/`STOREL` by level.
pub fn gen_store_var(entry: &SymbolEntry) -> String {
    match entry {
        SymbolEntry::Var { level, addr, .. } => match level {
            Level::Global => Instruction::StoreG(*addr).to_string() + "\n",
            Level::Local => Instruction::StoreL(*addr).to_string() + "\n",
        },
        _ => unreachable!("gen_store_var called on a non-variable symbol"),
    }
}

/// The default value pushed to pre-allocate a function's return slot
/// (or any other default-initialized stack cell) before a call.
pub fn push_default_for_type(ty: &Type) -> String {
    match ty {
        Type::Real => Instruction::PushF(0.0).to_string() + "\n",
        Type::String => "PUSHS \"\"\n".to_string(),
        _ => Instruction::PushI(0).to_string() + "\n",
    }
}

/// Hands out unique label names. Instruction/code text itself is
/// accumulated by the parser directly into plain `String`s (global
/// init code, local init code, subprogram code, statement/expression
/// fragments); this is the one piece of emission state that needs to
/// be shared and sequential, so it alone lives here.
#[derive(Debug, Default)]
pub struct Emitter {
    label_counter: u64,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a label unique within this compilation, sanitizing the
    /// prefix down to alphanumerics and defaulting to `L`.
    pub fn new_label(&mut self, prefix: &str) -> String {
        self.label_counter += 1;
        let mut clean: String = prefix.chars().filter(|c| c.is_alphanumeric()).collect();
        if clean.is_empty() {
            clean = "L".to_string();
        }
        format!("{clean}{}", self.label_counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_display_prints_exact_mnemonics() {
        assert_eq!(Instruction::PushI(3).to_string(), "PUSHI 3");
        assert_eq!(Instruction::Check(1, 3).to_string(), "CHECK 1, 3");
        assert_eq!(Instruction::Jz("L1".into()).to_string(), "JZ L1");
    }

    #[test]
    fn new_label_is_unique_and_sanitized() {
        let mut e = Emitter::new();
        assert_eq!(e.new_label("IF_END"), "IFEND1");
        assert_eq!(e.new_label("IF_END"), "IFEND2");
        assert_eq!(e.new_label("***"), "L3");
    }

    #[test]
    fn whole_valued_reals_still_print_a_decimal_point() {
        assert_eq!(Instruction::PushF(0.0).to_string(), "PUSHF 0.0");
        assert_eq!(Instruction::PushF(2.0).to_string(), "PUSHF 2.0");
        assert_eq!(Instruction::PushF(1.5).to_string(), "PUSHF 1.5");
        assert_eq!(Instruction::PushF(-3.0).to_string(), "PUSHF -3.0");
    }
}
