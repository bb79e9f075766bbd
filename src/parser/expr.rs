//! Expression parsing: the precedence-climbing chain from boolean OR
//! down to primaries, plus built-in and user function call codegen.
//!
//! Each level returns an [`ExprFragment`]: the static type, an optional
//! compile-time constant (used for range and divide-by-zero checks),
//! and the VM code that leaves the value on the stack when executed.

use super::Parser;
use crate::asm::{gen_load_var, push_default_for_type, Instruction};
use crate::error::{CompileError, SemanticError, SyntaxError};
use crate::lexer::TokenKind;
use crate::symtab::{Param, SymbolEntry};
use crate::types::{assign_compat, is_numeric, numeric_result, resolve_builtin, Type};

/// A compile-time constant value, used for range checks on array
/// indices and divide-by-zero detection. Only literals (and negations
/// of literals) carry one; everything else folds to `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Real(f64),
    Bool(bool),
}

#[derive(Debug, Clone)]
pub struct ExprFragment {
    pub ty: Type,
    pub const_value: Option<ConstValue>,
    pub code: String,
}

impl ExprFragment {
    fn runtime(ty: Type, code: String) -> Self {
        Self { ty, const_value: None, code }
    }
}

/// Pushes `left` then `right`, widening whichever side is integer to
/// real if the other side is real. Returns the combined code and
/// whether the result is real.
fn combine_numeric(left: &ExprFragment, right: &ExprFragment) -> (String, bool) {
    let real_result = left.ty == Type::Real || right.ty == Type::Real;
    let mut code = left.code.clone();
    if real_result && left.ty == Type::Integer {
        code.push_str(&Instruction::ItoF.to_string());
        code.push('\n');
    }
    code.push_str(&right.code);
    if real_result && right.ty == Type::Integer {
        code.push_str(&Instruction::ItoF.to_string());
        code.push('\n');
    }
    (code, real_result)
}

/// Returns the sole character of a length-1 string, or `None` otherwise.
fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    if chars.next().is_none() {
        Some(c)
    } else {
        None
    }
}

/// Folds `=`/`<>`/`<`/`<=`/`>`/`>=` over two compile-time constants, when
/// both sides carry one. Seeds future diagnostics/optimization the same
/// way arithmetic folding does; never changes what codegen emits.
fn fold_relational(op: &TokenKind, left: &Option<ConstValue>, right: &Option<ConstValue>) -> Option<ConstValue> {
    fn as_f64(c: ConstValue) -> Option<f64> {
        match c {
            ConstValue::Int(v) => Some(v as f64),
            ConstValue::Real(v) => Some(v),
            ConstValue::Bool(_) => None,
        }
    }

    let (l, r) = (*left.as_ref()?, *right.as_ref()?);
    let ordering = if let (Some(l), Some(r)) = (as_f64(l), as_f64(r)) {
        l.partial_cmp(&r)?
    } else if let (ConstValue::Bool(l), ConstValue::Bool(r)) = (l, r) {
        l.cmp(&r)
    } else {
        return None;
    };
    use std::cmp::Ordering::*;
    let result = match op {
        TokenKind::Eq => ordering == Equal,
        TokenKind::NotEq => ordering != Equal,
        TokenKind::Less => ordering == Less,
        TokenKind::LessEq => ordering != Greater,
        TokenKind::Greater => ordering == Greater,
        TokenKind::GreaterEq => ordering != Less,
        _ => return None,
    };
    Some(ConstValue::Bool(result))
}

impl<'a> Parser<'a> {
    pub(super) fn expr(&mut self) -> Result<ExprFragment, CompileError> {
        self.or_expr()
    }

    /// `or_expr : and_expr (OR and_expr)*`, short-circuiting: if the
    /// left side is true, the right side is never evaluated.
    fn or_expr(&mut self) -> Result<ExprFragment, CompileError> {
        let mut left = self.and_expr()?;
        while self.at(&TokenKind::Or) {
            let line = self.line();
            self.bump()?;
            self.require_boolean(&left, "OR", line)?;
            let right = self.and_expr()?;
            self.require_boolean(&right, "OR", line)?;

            let right_label = self.ctx.emitter.new_label("ORRIGHT");
            let end_label = self.ctx.emitter.new_label("OREND");
            let mut code = left.code;
            code.push_str(&Instruction::Jz(right_label.clone()).to_string());
            code.push('\n');
            code.push_str(&Instruction::PushI(1).to_string());
            code.push('\n');
            code.push_str(&Instruction::Jump(end_label.clone()).to_string());
            code.push('\n');
            code.push_str(&format!("{right_label}:\n"));
            code.push_str(&right.code);
            code.push_str(&format!("{end_label}:\n"));

            left = ExprFragment::runtime(Type::Boolean, code);
        }
        Ok(left)
    }

    /// `and_expr : rel_expr (AND rel_expr)*`, short-circuiting: if the
    /// left side is false, the right side is never evaluated.
    fn and_expr(&mut self) -> Result<ExprFragment, CompileError> {
        let mut left = self.rel_expr()?;
        while self.at(&TokenKind::And) {
            let line = self.line();
            self.bump()?;
            self.require_boolean(&left, "AND", line)?;
            let right = self.rel_expr()?;
            self.require_boolean(&right, "AND", line)?;

            let false_label = self.ctx.emitter.new_label("ANDFALSE");
            let end_label = self.ctx.emitter.new_label("ANDEND");
            let mut code = left.code;
            code.push_str(&Instruction::Jz(false_label.clone()).to_string());
            code.push('\n');
            code.push_str(&right.code);
            code.push_str(&Instruction::Jump(end_label.clone()).to_string());
            code.push('\n');
            code.push_str(&format!("{false_label}:\n"));
            code.push_str(&Instruction::PushI(0).to_string());
            code.push('\n');
            code.push_str(&format!("{end_label}:\n"));

            left = ExprFragment::runtime(Type::Boolean, code);
        }
        Ok(left)
    }

    fn require_boolean(&self, e: &ExprFragment, op: &str, line: usize) -> Result<(), CompileError> {
        if e.ty != Type::Boolean {
            Err(SemanticError::new(format!("{op} requires boolean operands, got {}", e.ty), line).into())
        } else {
            Ok(())
        }
    }

    /// `rel_expr : add_expr ((= | <> | < | <= | > | >=) add_expr)?`
    /// Non-associative: Pascal does not chain comparisons.
    fn rel_expr(&mut self) -> Result<ExprFragment, CompileError> {
        let left = self.add_expr()?;
        let (op, ordering) = match self.current.kind {
            TokenKind::Eq => (TokenKind::Eq, false),
            TokenKind::NotEq => (TokenKind::NotEq, false),
            TokenKind::Less => (TokenKind::Less, true),
            TokenKind::LessEq => (TokenKind::LessEq, true),
            TokenKind::Greater => (TokenKind::Greater, true),
            TokenKind::GreaterEq => (TokenKind::GreaterEq, true),
            _ => return Ok(left),
        };
        let line = self.line();
        self.bump()?;
        let right = self.add_expr()?;

        if ordering {
            if !is_numeric(&left.ty) || !is_numeric(&right.ty) {
                return Err(SemanticError::new(
                    format!("relational operator requires numeric operands, got {} and {}", left.ty, right.ty),
                    line,
                )
                .into());
            }
        } else if !(left.ty == right.ty || (is_numeric(&left.ty) && is_numeric(&right.ty))) {
            return Err(SemanticError::new(
                format!("cannot compare {} with {}", left.ty, right.ty),
                line,
            )
            .into());
        }

        let (mut code, is_real) = combine_numeric(&left, &right);
        let instr = match (&op, is_real) {
            (TokenKind::Eq, _) => Instruction::Equal,
            (TokenKind::NotEq, _) => Instruction::Equal,
            (TokenKind::Less, false) => Instruction::Inf,
            (TokenKind::Less, true) => Instruction::FInf,
            (TokenKind::LessEq, false) => Instruction::InfEq,
            (TokenKind::LessEq, true) => Instruction::FInfEq,
            (TokenKind::Greater, false) => Instruction::Sup,
            (TokenKind::Greater, true) => Instruction::FSup,
            (TokenKind::GreaterEq, false) => Instruction::SupEq,
            (TokenKind::GreaterEq, true) => Instruction::FSupEq,
            _ => unreachable!(),
        };
        code.push_str(&instr.to_string());
        code.push('\n');
        if op == TokenKind::NotEq {
            code.push_str(&Instruction::Not.to_string());
            code.push('\n');
        }
        let const_value = fold_relational(&op, &left.const_value, &right.const_value);
        Ok(ExprFragment { ty: Type::Boolean, const_value, code })
    }

    /// `add_expr : mul_expr ((+ | -) mul_expr)*`
    fn add_expr(&mut self) -> Result<ExprFragment, CompileError> {
        let mut left = self.mul_expr()?;
        loop {
            let plus = self.at(&TokenKind::Plus);
            let minus = self.at(&TokenKind::Minus);
            if !plus && !minus {
                break;
            }
            let line = self.line();
            self.bump()?;
            let right = self.mul_expr()?;
            if !is_numeric(&left.ty) || !is_numeric(&right.ty) {
                return Err(SemanticError::new(
                    format!("arithmetic requires numeric operands, got {} and {}", left.ty, right.ty),
                    line,
                )
                .into());
            }
            let (mut code, is_real) = combine_numeric(&left, &right);
            let instr = match (plus, is_real) {
                (true, false) => Instruction::Add,
                (true, true) => Instruction::FAdd,
                (false, false) => Instruction::Sub,
                (false, true) => Instruction::FSub,
            };
            code.push_str(&instr.to_string());
            code.push('\n');
            left = ExprFragment::runtime(numeric_result(&left.ty, &right.ty), code);
        }
        Ok(left)
    }

    /// `mul_expr : unary_expr ((* | / | DIV | MOD) unary_expr)*`
    fn mul_expr(&mut self) -> Result<ExprFragment, CompileError> {
        let mut left = self.unary_expr()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => TokenKind::Star,
                TokenKind::Slash => TokenKind::Slash,
                TokenKind::Div => TokenKind::Div,
                TokenKind::Mod => TokenKind::Mod,
                _ => break,
            };
            let line = self.line();
            self.bump()?;
            let right = self.unary_expr()?;

            match op {
                TokenKind::Star => {
                    if !is_numeric(&left.ty) || !is_numeric(&right.ty) {
                        return Err(SemanticError::new(
                            format!("'*' requires numeric operands, got {} and {}", left.ty, right.ty),
                            line,
                        )
                        .into());
                    }
                    let (mut code, is_real) = combine_numeric(&left, &right);
                    code.push_str(&(if is_real { Instruction::FMul } else { Instruction::Mul }).to_string());
                    code.push('\n');
                    left = ExprFragment::runtime(numeric_result(&left.ty, &right.ty), code);
                }
                TokenKind::Slash => {
                    if !is_numeric(&left.ty) || !is_numeric(&right.ty) {
                        return Err(SemanticError::new(
                            format!("'/' requires numeric operands, got {} and {}", left.ty, right.ty),
                            line,
                        )
                        .into());
                    }
                    let divisor_is_zero = match right.const_value {
                        Some(ConstValue::Int(0)) => true,
                        Some(ConstValue::Real(r)) => r == 0.0,
                        _ => false,
                    };
                    if divisor_is_zero {
                        return Err(SemanticError::new("division by zero", line).into());
                    }
                    let mut code = left.code.clone();
                    if left.ty == Type::Integer {
                        code.push_str(&Instruction::ItoF.to_string());
                        code.push('\n');
                    }
                    code.push_str(&right.code);
                    if right.ty == Type::Integer {
                        code.push_str(&Instruction::ItoF.to_string());
                        code.push('\n');
                    }
                    code.push_str(&Instruction::FDiv.to_string());
                    code.push('\n');
                    left = ExprFragment::runtime(Type::Real, code);
                }
                TokenKind::Div | TokenKind::Mod => {
                    if left.ty != Type::Integer || right.ty != Type::Integer {
                        return Err(SemanticError::new(
                            format!("'{op}' requires integer operands, got {} and {}", left.ty, right.ty),
                            line,
                        )
                        .into());
                    }
                    if matches!(right.const_value, Some(ConstValue::Int(0))) {
                        return Err(SemanticError::new("division by zero", line).into());
                    }
                    let mut code = left.code.clone();
                    code.push_str(&right.code);
                    code.push_str(&(if op == TokenKind::Div { Instruction::Div } else { Instruction::Mod }).to_string());
                    code.push('\n');
                    left = ExprFragment::runtime(Type::Integer, code);
                }
                _ => unreachable!(),
            }
        }
        Ok(left)
    }

    /// `unary_expr : (NOT | '-')? primary`
    fn unary_expr(&mut self) -> Result<ExprFragment, CompileError> {
        if self.at(&TokenKind::Not) {
            let line = self.line();
            self.bump()?;
            let operand = self.unary_expr()?;
            if operand.ty != Type::Boolean {
                return Err(SemanticError::new(format!("NOT requires a boolean operand, got {}", operand.ty), line).into());
            }
            let mut code = operand.code;
            code.push_str(&Instruction::Not.to_string());
            code.push('\n');
            let const_value = match operand.const_value {
                Some(ConstValue::Bool(b)) => Some(ConstValue::Bool(!b)),
                _ => None,
            };
            return Ok(ExprFragment { ty: Type::Boolean, const_value, code });
        }
        if self.at(&TokenKind::Minus) {
            let line = self.line();
            self.bump()?;
            let operand = self.unary_expr()?;
            if !is_numeric(&operand.ty) {
                return Err(SemanticError::new(format!("unary '-' requires a numeric operand, got {}", operand.ty), line).into());
            }
            let is_real = operand.ty == Type::Real;
            let mut code = (if is_real { Instruction::PushF(0.0) } else { Instruction::PushI(0) }).to_string();
            code.push('\n');
            code.push_str(&operand.code);
            code.push_str(&(if is_real { Instruction::FSub } else { Instruction::Sub }).to_string());
            code.push('\n');
            let const_value = match operand.const_value {
                Some(ConstValue::Int(v)) => Some(ConstValue::Int(-v)),
                Some(ConstValue::Real(v)) => Some(ConstValue::Real(-v)),
                _ => None,
            };
            return Ok(ExprFragment { ty: operand.ty, const_value, code });
        }
        self.primary()
    }

    /// `primary : literal | var_ref | '(' expr ')' | ID '(' args ')'`
    fn primary(&mut self) -> Result<ExprFragment, CompileError> {
        let line = self.line();
        match self.current.kind.clone() {
            TokenKind::IntLiteral(v) => {
                self.bump()?;
                Ok(ExprFragment {
                    ty: Type::Integer,
                    const_value: Some(ConstValue::Int(v)),
                    code: format!("{}\n", Instruction::PushI(v)),
                })
            }
            TokenKind::RealLiteral(v) => {
                self.bump()?;
                Ok(ExprFragment {
                    ty: Type::Real,
                    const_value: Some(ConstValue::Real(v)),
                    code: format!("{}\n", Instruction::PushF(v)),
                })
            }
            TokenKind::StringLiteral(s) => {
                self.bump()?;
                if let Some(c) = single_char(&s) {
                    // A char is an integer ASCII code on this VM (the
                    // whole premise behind ord/chr/CHARAT/WRITECHR), so
                    // a length-1 literal pushes its code directly rather
                    // than a one-character string.
                    let code_point = c as i64;
                    return Ok(ExprFragment {
                        ty: Type::Char,
                        const_value: Some(ConstValue::Int(code_point)),
                        code: format!("{}\n", Instruction::PushI(code_point)),
                    });
                }
                Ok(ExprFragment {
                    ty: Type::String,
                    const_value: None,
                    code: format!("{}\n", Instruction::PushS(s)),
                })
            }
            TokenKind::True => {
                self.bump()?;
                Ok(ExprFragment {
                    ty: Type::Boolean,
                    const_value: Some(ConstValue::Bool(true)),
                    code: format!("{}\n", Instruction::PushI(1)),
                })
            }
            TokenKind::False => {
                self.bump()?;
                Ok(ExprFragment {
                    ty: Type::Boolean,
                    const_value: Some(ConstValue::Bool(false)),
                    code: format!("{}\n", Instruction::PushI(0)),
                })
            }
            TokenKind::LParen => {
                self.bump()?;
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                self.bump()?;
                self.ident_led_expr(name, line)
            }
            other => Err(SyntaxError {
                message: format!("unexpected token {other} in expression"),
                line,
            }
            .into()),
        }
    }

    /// Disambiguates an identifier-led primary: a variable reference
    /// (possibly indexed), a built-in call, or a user function call.
    fn ident_led_expr(&mut self, name: String, line: usize) -> Result<ExprFragment, CompileError> {
        if crate::types::is_builtin_name(&name) && self.at(&TokenKind::LParen) {
            return self.builtin_call(&name, line);
        }

        // A function's own local scope shadows its name with its return
        // slot, so a recursive call site must be recognized before
        // falling through to the generic symbol lookup below.
        if self.at(&TokenKind::LParen) {
            if let Some(sub) = self.ctx.current_subprog() {
                if sub.is_function && sub.name == name {
                    let label = sub.name.clone();
                    let params = sub.params.clone();
                    let ret = sub.ret.clone().expect("an active function always has a return type");
                    self.bump()?;
                    let args = self.arg_list_opt(TokenKind::RParen)?;
                    self.expect(TokenKind::RParen)?;
                    return self.call_function(&label, &params, &ret, line, args);
                }
            }
        }

        if self.at(&TokenKind::LParen) {
            if let Some(SymbolEntry::Func { .. }) = self.ctx.symtab.lookup(&name) {
                self.bump()?;
                let args = self.arg_list_opt(TokenKind::RParen)?;
                self.expect(TokenKind::RParen)?;
                return self.user_func_call(&name, line, args);
            }
        }

        let index_expr = if self.at(&TokenKind::LBracket) {
            self.bump()?;
            let idx = self.expr()?;
            self.expect(TokenKind::RBracket)?;
            Some(idx)
        } else {
            None
        };

        let lvalue = self.resolve_var_or_index(&name, index_expr, line)?;
        let info = self
            .ctx
            .symtab
            .lookup(&name)
            .expect("var reference was just resolved")
            .clone();

        if !lvalue.indexed {
            if lvalue.ty.is_array() {
                return Err(SemanticError::new(format!("'{name}' is an entire array and cannot be used as a value"), line).into());
            }
            return Ok(ExprFragment::runtime(lvalue.ty, gen_load_var(&info)));
        }

        if lvalue.string_indexed {
            let mut code = gen_load_var(&info);
            code.push_str(&lvalue.index_expr.expect("indexed lvalue carries an index").code);
            code.push_str(&Instruction::CharAt.to_string());
            code.push('\n');
            return Ok(ExprFragment::runtime(Type::Char, code));
        }

        let (lo, hi) = match &info {
            SymbolEntry::Var { ty: Type::Array { lo, hi, .. }, .. } => (*lo, *hi),
            _ => return Err(SemanticError::new(format!("'{name}' is not an array"), line).into()),
        };
        let mut code = gen_load_var(&info);
        code.push_str(&lvalue.index_expr.expect("indexed lvalue carries an index").code);
        code.push_str(&Instruction::Check(lo, hi).to_string());
        code.push('\n');
        if lo != 0 {
            code.push_str(&format!("{}\n{}\n", Instruction::PushI(lo), Instruction::Sub));
        }
        code.push_str(&Instruction::LoadN.to_string());
        code.push('\n');
        Ok(ExprFragment::runtime(lvalue.ty, code))
    }

    fn builtin_call(&mut self, name: &str, line: usize) -> Result<ExprFragment, CompileError> {
        if name == "length" {
            return self.length_call(line);
        }

        self.expect(TokenKind::LParen)?;
        let args = self.arg_list_opt(TokenKind::RParen)?;
        self.expect(TokenKind::RParen)?;
        let arg_types: Vec<Type> = args.iter().map(|a| a.ty.clone()).collect();
        let ret = resolve_builtin(name, &arg_types).ok_or_else(|| {
            SemanticError::new(
                format!("no overload of '{name}' accepts {}", crate::types::fmt_sig_args(&arg_types)),
                line,
            )
        })?;

        match name {
            "concat" => {
                let mut code = args[0].code.clone();
                code.push_str(&args[1].code);
                code.push_str(&Instruction::Concat.to_string());
                code.push('\n');
                Ok(ExprFragment::runtime(ret, code))
            }
            "ord" => Ok(ExprFragment::runtime(ret, args[0].code.clone())),
            "chr" => {
                let mut code = args[0].code.clone();
                code.push_str(&Instruction::Check(0, 255).to_string());
                code.push('\n');
                Ok(ExprFragment::runtime(ret, code))
            }
            "odd" => {
                let mut code = args[0].code.clone();
                code.push_str(&format!(
                    "{}\n{}\n{}\n{}\n",
                    Instruction::PushI(2),
                    Instruction::Mod,
                    Instruction::PushI(0),
                    Instruction::Equal
                ));
                code.push_str(&Instruction::Not.to_string());
                code.push('\n');
                Ok(ExprFragment::runtime(ret, code))
            }
            "trunc" => {
                let mut code = args[0].code.clone();
                code.push_str(&Instruction::FtoI.to_string());
                code.push('\n');
                Ok(ExprFragment::runtime(ret, code))
            }
            "round" => {
                let pos_label = self.ctx.emitter.new_label("ROUNDPOS");
                let end_label = self.ctx.emitter.new_label("ROUNDEND");
                let mut code = args[0].code.clone();
                code.push_str(&Instruction::Dup(1).to_string());
                code.push('\n');
                code.push_str(&format!("{}\n{}\n", Instruction::PushF(0.0), Instruction::FInf));
                code.push_str(&Instruction::Jz(pos_label.clone()).to_string());
                code.push('\n');
                code.push_str(&format!("{}\n{}\n{}\n", Instruction::PushF(0.5), Instruction::FSub, Instruction::FtoI));
                code.push_str(&Instruction::Jump(end_label.clone()).to_string());
                code.push('\n');
                code.push_str(&format!("{pos_label}:\n"));
                code.push_str(&format!("{}\n{}\n{}\n", Instruction::PushF(0.5), Instruction::FAdd, Instruction::FtoI));
                code.push_str(&format!("{end_label}:\n"));
                Ok(ExprFragment::runtime(ret, code))
            }
            "abs" => {
                let ok_label = self.ctx.emitter.new_label("ABSOK");
                let is_real = args[0].ty == Type::Real;
                let zero = if is_real { Instruction::PushF(0.0) } else { Instruction::PushI(0) };
                let cmp = if is_real { Instruction::FInf } else { Instruction::Inf };
                let sub = if is_real { Instruction::FSub } else { Instruction::Sub };
                let mut code = args[0].code.clone();
                code.push_str(&Instruction::Dup(1).to_string());
                code.push('\n');
                code.push_str(&format!("{zero}\n{cmp}\n"));
                code.push_str(&Instruction::Jz(ok_label.clone()).to_string());
                code.push('\n');
                code.push_str(&format!("{zero}\n{}\n{sub}\n", Instruction::Swap));
                code.push_str(&format!("{ok_label}:\n"));
                Ok(ExprFragment::runtime(ret, code))
            }
            _ => unreachable!("exhaustive over BUILTIN_FUNCS"),
        }
    }

    /// `length(ID)`: evaluated at compile time for an array argument
    /// (its size is static), at runtime via `STRLEN` for a string.
    fn length_call(&mut self, line: usize) -> Result<ExprFragment, CompileError> {
        self.expect(TokenKind::LParen)?;
        let (name, id_line) = self.expect_ident()?;
        self.expect(TokenKind::RParen)?;

        let info = self
            .ctx
            .symtab
            .lookup(&name)
            .ok_or_else(|| SemanticError::new(format!("'{name}' used without being declared"), id_line))?
            .clone();
        let ty = match &info {
            SymbolEntry::Var { ty, .. } => ty.clone(),
            other => {
                return Err(SemanticError::new(
                    format!("'{name}' is not a variable (it is a {})", other.kind_name()),
                    id_line,
                )
                .into())
            }
        };

        match ty {
            Type::Array { lo, hi, .. } => {
                let size = hi - lo + 1;
                Ok(ExprFragment {
                    ty: Type::Integer,
                    const_value: Some(ConstValue::Int(size)),
                    code: format!("{}\n", Instruction::PushI(size)),
                })
            }
            Type::String => {
                let mut code = gen_load_var(&info);
                code.push_str(&Instruction::StrLen.to_string());
                code.push('\n');
                Ok(ExprFragment::runtime(Type::Integer, code))
            }
            other => Err(SemanticError::new(format!("length() expects a string or array argument, got {other}"), line).into()),
        }
    }

    fn user_func_call(&mut self, name: &str, line: usize, args: Vec<ExprFragment>) -> Result<ExprFragment, CompileError> {
        let info = self
            .ctx
            .symtab
            .lookup(name)
            .expect("caller already checked this name resolves to a Func")
            .clone();
        let (params, ret) = match &info {
            SymbolEntry::Func { params, ret, .. } => (params.clone(), ret.clone()),
            _ => unreachable!(),
        };
        self.call_function(name, &params, &ret, line, args)
    }

    /// Shared call codegen for both an ordinary function call (signature
    /// resolved through the symbol table) and a recursive call from
    /// within the function's own body (signature carried on the active
    /// subprogram stack, since the local scope shadows the name).
    fn call_function(
        &mut self,
        label: &str,
        params: &[Param],
        ret: &Type,
        line: usize,
        args: Vec<ExprFragment>,
    ) -> Result<ExprFragment, CompileError> {
        if args.len() != params.len() {
            return Err(SemanticError::new(
                format!(
                    "'{label}' expects {} args, got {}: {}",
                    params.len(),
                    args.len(),
                    crate::types::fmt_sig_args(&args.iter().map(|a| a.ty.clone()).collect::<Vec<_>>())
                ),
                line,
            )
            .into());
        }
        for (i, (arg, param)) in args.iter().zip(params.iter()).enumerate() {
            if !assign_compat(&param.ty, &arg.ty) {
                return Err(SemanticError::new(
                    format!("arg {} of '{label}' is incompatible: expected {}, got {}", i + 1, param.ty, arg.ty),
                    line,
                )
                .into());
            }
        }

        let mut code = push_default_for_type(ret);
        for (arg, param) in args.iter().zip(params.iter()) {
            code.push_str(&arg.code);
            if param.ty == Type::Real && arg.ty == Type::Integer {
                code.push_str(&Instruction::ItoF.to_string());
                code.push('\n');
            }
        }
        code.push_str(&format!("{}\n{}\n", Instruction::PushA(label.to_string()), Instruction::Call));
        code.push_str(&Instruction::Pop(args.len() as i64).to_string());
        code.push('\n');
        Ok(ExprFragment::runtime(ret.clone(), code))
    }
}
