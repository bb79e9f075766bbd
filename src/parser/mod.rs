//! The parser/translator: a hand-written recursive-descent,
//! precedence-climbing parser that performs semantic checks and emits
//! VM code inline, as each construct is recognized. Each parsing
//! method plays the role a grammar-reduction action would play in a
//! generated LALR parser, so the single-pass property (checks and
//! emission happen exactly once, during parsing) is preserved without
//! a separate AST pass.

mod expr;

use crate::asm::{gen_load_var, gen_store_var, Instruction};
use crate::context::{ActiveSubprog, CompilerContext, PendingHeader};
use crate::error::{CompileError, SemanticError, SyntaxError};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::symtab::{Level, Param, ReadonlyReason, SymbolEntry};
use crate::types::{assign_compat, Type};

pub use expr::ConstValue;
use expr::ExprFragment;

/// The resolved target of an assignment, a READLN target, or a bare
/// variable reference: a simple variable or one array/string element.
#[derive(Debug, Clone)]
pub struct LValue {
    pub name: String,
    pub ty: Type,
    pub indexed: bool,
    pub index_expr: Option<Box<ExprFragment>>,
    pub string_indexed: bool,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    ctx: CompilerContext,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self, CompileError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        let mut ctx = CompilerContext::new();
        register_builtins(&mut ctx);
        Ok(Self {
            lexer,
            current,
            ctx,
        })
    }

    // ---- token stream helpers ----------------------------------------

    fn line(&self) -> usize {
        self.current.line
    }

    fn bump(&mut self) -> Result<Token, CompileError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, CompileError> {
        if self.current.kind == kind {
            self.bump()
        } else {
            Err(SyntaxError {
                message: format!("expected {kind}, found {}", self.current.kind),
                line: self.line(),
            }
            .into())
        }
    }

    fn expect_ident(&mut self) -> Result<(String, usize), CompileError> {
        let line = self.line();
        match &self.current.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.bump()?;
                Ok((name, line))
            }
            other => Err(SyntaxError {
                message: format!("expected identifier, found {other}"),
                line,
            }
            .into()),
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.current.kind == kind
    }

    fn semerr<T>(&self, message: impl Into<String>) -> Result<T, CompileError> {
        Err(SemanticError::new(message, self.line()).into())
    }

    // ---- program structure --------------------------------------------

    /// `program ID ; block .`
    pub fn parse_program(mut self) -> Result<String, CompileError> {
        self.expect(TokenKind::Program)?;
        let (name, line) = self.expect_ident()?;
        if matches!(
            self.ctx.symtab.global_scope_lookup(&name),
            Some(SymbolEntry::BuiltinFunc)
        ) {
            return Err(SemanticError::new(
                format!("program name '{name}' is reserved (builtin) and cannot be used"),
                line,
            )
            .into());
        }
        self.expect(TokenKind::Semicolon)?;

        let body_code = self.block()?;

        self.expect(TokenKind::Dot)?;
        if self.current.kind != TokenKind::Eof {
            return Err(SyntaxError {
                message: format!("unexpected trailing input: {}", self.current.kind),
                line: self.line(),
            }
            .into());
        }

        let mut listing = String::new();
        listing.push_str(&Instruction::Jump("MAIN".to_string()).to_string());
        listing.push('\n');
        listing.push_str(&self.ctx.subprog_code);
        listing.push_str("MAIN:\n");
        listing.push_str(&Instruction::PushN(self.ctx.next_global_addr).to_string());
        listing.push('\n');
        listing.push_str(&self.ctx.global_init_code);
        listing.push_str(&Instruction::Start.to_string());
        listing.push('\n');
        listing.push_str(&body_code);
        listing.push_str(&Instruction::Stop.to_string());
        listing.push('\n');
        Ok(listing)
    }

    /// `block : decls compound_stmt`
    fn block(&mut self) -> Result<String, CompileError> {
        self.decls()?;
        self.compound_stmt()
    }

    fn decls(&mut self) -> Result<(), CompileError> {
        loop {
            match self.current.kind {
                TokenKind::Var => self.var_section()?,
                TokenKind::Function => self.function_decl()?,
                TokenKind::Procedure => self.procedure_decl()?,
                _ => break,
            }
        }
        Ok(())
    }

    // ---- declarations ---------------------------------------------------

    /// `var_section : VAR (id_list COLON type SEMICOLON)+`
    fn var_section(&mut self) -> Result<(), CompileError> {
        self.expect(TokenKind::Var)?;
        loop {
            let ids = self.id_list()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.type_spec()?;
            self.expect(TokenKind::Semicolon)?;
            for (name, line) in ids {
                self.declare_variable(&name, line, ty.clone())?;
            }
            if !matches!(self.current.kind, TokenKind::Ident(_)) {
                break;
            }
        }
        Ok(())
    }

    fn declare_variable(&mut self, name: &str, line: usize, ty: Type) -> Result<(), CompileError> {
        let in_subprog = self.ctx.symtab.depth() > 0;
        if !in_subprog {
            let addr = self.ctx.next_global_addr;
            self.ctx.next_global_addr += 1;
            self.declare_or_err(
                name,
                SymbolEntry::Var {
                    ty: ty.clone(),
                    level: Level::Global,
                    addr,
                },
                line,
            )?;
            if let Type::Array { lo, hi, .. } = ty {
                let size = hi - lo + 1;
                self.ctx.global_init_code.push_str(&format!(
                    "{}\n{}\n{}\n",
                    Instruction::PushI(size),
                    Instruction::AllocN,
                    Instruction::StoreG(addr)
                ));
            }
        } else {
            let addr = self.ctx.alloc_local_addr();
            self.declare_or_err(
                name,
                SymbolEntry::Var {
                    ty: ty.clone(),
                    level: Level::Local,
                    addr,
                },
                line,
            )?;
            if let Type::Array { lo, hi, .. } = ty {
                let size = hi - lo + 1;
                self.ctx.append_local_init(&format!(
                    "{}\n{}\n{}\n",
                    Instruction::PushI(size),
                    Instruction::AllocN,
                    Instruction::StoreL(addr)
                ));
            }
        }
        Ok(())
    }

    fn declare_or_err(
        &mut self,
        name: &str,
        entry: SymbolEntry,
        line: usize,
    ) -> Result<(), CompileError> {
        self.ctx
            .symtab
            .declare(name, entry, false)
            .map_err(|e| {
                if e.shadows_builtin {
                    SemanticError::new(
                        format!("identifier '{name}' is reserved (builtin) and cannot be redeclared"),
                        line,
                    )
                } else {
                    SemanticError::new(format!("identifier '{name}' already declared in this scope"), line)
                }
            })?;
        Ok(())
    }

    /// `id_list : ID (COMMA ID)*`
    fn id_list(&mut self) -> Result<Vec<(String, usize)>, CompileError> {
        let mut out = vec![self.expect_ident()?];
        while self.at(&TokenKind::Comma) {
            self.bump()?;
            out.push(self.expect_ident()?);
        }
        Ok(out)
    }

    fn type_spec(&mut self) -> Result<Type, CompileError> {
        let line = self.line();
        match self.current.kind.clone() {
            TokenKind::Integer => {
                self.bump()?;
                Ok(Type::Integer)
            }
            TokenKind::Real => {
                self.bump()?;
                Ok(Type::Real)
            }
            TokenKind::Boolean => {
                self.bump()?;
                Ok(Type::Boolean)
            }
            TokenKind::Char => {
                self.bump()?;
                Ok(Type::Char)
            }
            TokenKind::String => {
                self.bump()?;
                Ok(Type::String)
            }
            TokenKind::Array => {
                self.bump()?;
                self.expect(TokenKind::LBracket)?;
                let (lo, hi) = self.range()?;
                self.expect(TokenKind::RBracket)?;
                self.expect(TokenKind::Of)?;
                let element = self.type_spec()?;
                Ok(Type::array(lo, hi, element))
            }
            other => Err(SyntaxError {
                message: format!("expected a type, found {other}"),
                line,
            }
            .into()),
        }
    }

    /// `range : NUMBER_INT .. NUMBER_INT`
    fn range(&mut self) -> Result<(i64, i64), CompileError> {
        let line = self.line();
        let lo = self.expect_int_literal()?;
        self.expect(TokenKind::DotDot)?;
        let hi = self.expect_int_literal()?;
        if lo > hi {
            return Err(
                SemanticError::new(format!("invalid range: {lo}..{hi} (lower bound greater than upper bound)"), line)
                    .into(),
            );
        }
        Ok((lo, hi))
    }

    fn expect_int_literal(&mut self) -> Result<i64, CompileError> {
        let line = self.line();
        match self.current.kind {
            TokenKind::IntLiteral(v) => {
                self.bump()?;
                Ok(v)
            }
            _ => Err(SyntaxError {
                message: "expected an integer literal".to_string(),
                line,
            }
            .into()),
        }
    }

    /// `param_list : param (SEMICOLON param)*`, `param : id_list COLON type`
    fn param_list(&mut self) -> Result<Vec<Param>, CompileError> {
        let mut params = Vec::new();
        if self.at(&TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let ids = self.id_list()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.type_spec()?;
            for (name, line) in ids {
                params.push(Param { name, ty: ty.clone(), line });
            }
            if self.at(&TokenKind::Semicolon) {
                self.bump()?;
            } else {
                break;
            }
        }
        Ok(params)
    }

    // ---- subprograms -----------------------------------------------------

    /// `function_header func_enter block ;`
    fn function_decl(&mut self) -> Result<(), CompileError> {
        self.expect(TokenKind::Function)?;
        let (name, line) = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;
        let params = self.param_list()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Colon)?;
        let ret = self.type_spec()?;
        self.expect(TokenKind::Semicolon)?;

        self.ctx.set_pending_header(PendingHeader {
            name: name.clone(),
            params: params.clone(),
            ret: Some(ret.clone()),
            line,
        });
        self.func_enter()?;

        let arity = params.len();
        let body_code = self.block()?;
        self.expect(TokenKind::Semicolon)?;

        if !self.ctx.is_return_assigned() {
            return Err(SemanticError::new(
                format!("function '{name}' does not assign its return value"),
                line,
            )
            .into());
        }
        self.ctx.pop_active_subprog();
        let (nlocals, local_init) = self.ctx.exit_subprogram();
        self.ctx.symtab.pop();

        let mut code = String::new();
        code.push_str(&format!("{name}:\n"));
        code.push_str(&Instruction::PushN(nlocals).to_string());
        code.push('\n');
        code.push_str(&local_init);
        code.push_str(&body_code);
        code.push_str(&Instruction::PushL(0).to_string());
        code.push('\n');
        code.push_str(&Instruction::StoreL(-(arity as i64 + 1)).to_string());
        code.push('\n');
        code.push_str(&Instruction::Return.to_string());
        code.push('\n');
        self.ctx.subprog_code.push_str(&code);
        Ok(())
    }

    fn func_enter(&mut self) -> Result<(), CompileError> {
        let header = self
            .ctx
            .take_pending_header()
            .expect("func_enter called without a pending header");
        let arity = header.params.len();

        self.declare_or_err(
            &header.name,
            SymbolEntry::Func {
                params: header.params.clone(),
                ret: header.ret.clone().expect("function header always has a return type"),
                label: header.name.clone(),
            },
            header.line,
        )?;

        self.ctx.symtab.push();
        self.ctx.enter_subprogram(1);

        self.ctx
            .symtab
            .declare(
                &header.name,
                SymbolEntry::Var {
                    ty: header.ret.clone().unwrap(),
                    level: Level::Local,
                    addr: 0,
                },
                false,
            )
            .expect("the return slot cannot collide, it is declared into a fresh scope");

        for p in &header.params {
            if p.name == header.name {
                return Err(SemanticError::new(
                    format!(
                        "parameter '{}' cannot share the name of function '{}' (collides with the return variable)",
                        p.name, header.name
                    ),
                    p.line,
                )
                .into());
            }
        }

        for (i, p) in header.params.iter().enumerate() {
            let addr = i as i64 - arity as i64;
            self.declare_or_err(&p.name, SymbolEntry::Var { ty: p.ty.clone(), level: Level::Local, addr }, p.line)?;
        }

        self.ctx.push_active_subprog(ActiveSubprog {
            is_function: true,
            name: header.name,
            line: header.line,
            params: header.params,
            ret: header.ret,
        });
        Ok(())
    }

    /// `procedure_header proc_enter block ;`
    fn procedure_decl(&mut self) -> Result<(), CompileError> {
        self.expect(TokenKind::Procedure)?;
        let (name, line) = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;
        let params = self.param_list()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;

        self.ctx.set_pending_header(PendingHeader {
            name: name.clone(),
            params: params.clone(),
            ret: None,
            line,
        });
        self.proc_enter()?;

        let body_code = self.block()?;
        self.expect(TokenKind::Semicolon)?;

        self.ctx.pop_active_subprog();
        let (nlocals, local_init) = self.ctx.exit_subprogram();
        self.ctx.symtab.pop();

        let mut code = String::new();
        code.push_str(&format!("{name}:\n"));
        code.push_str(&Instruction::PushN(nlocals).to_string());
        code.push('\n');
        code.push_str(&local_init);
        code.push_str(&body_code);
        code.push_str(&Instruction::Return.to_string());
        code.push('\n');
        self.ctx.subprog_code.push_str(&code);
        Ok(())
    }

    fn proc_enter(&mut self) -> Result<(), CompileError> {
        let header = self
            .ctx
            .take_pending_header()
            .expect("proc_enter called without a pending header");
        let arity = header.params.len();

        self.declare_or_err(
            &header.name,
            SymbolEntry::Proc {
                params: header.params.clone(),
                label: header.name.clone(),
            },
            header.line,
        )?;

        self.ctx.symtab.push();
        self.ctx.enter_subprogram(0);

        for (i, p) in header.params.iter().enumerate() {
            let addr = i as i64 - arity as i64;
            self.declare_or_err(&p.name, SymbolEntry::Var { ty: p.ty.clone(), level: Level::Local, addr }, p.line)?;
        }

        self.ctx.push_active_subprog(ActiveSubprog {
            is_function: false,
            name: header.name,
            line: header.line,
            params: header.params,
            ret: None,
        });
        Ok(())
    }

    // ---- statements --------------------------------------------------------

    /// `compound_stmt : BEGIN stmt_list? END`
    fn compound_stmt(&mut self) -> Result<String, CompileError> {
        self.expect(TokenKind::Begin)?;
        let mut code = String::new();
        if !self.at(&TokenKind::End) {
            code.push_str(&self.stmt()?);
            while self.at(&TokenKind::Semicolon) {
                self.bump()?;
                if self.at(&TokenKind::End) {
                    break;
                }
                code.push_str(&self.stmt()?);
            }
        }
        self.expect(TokenKind::End)?;
        Ok(code)
    }

    fn stmt(&mut self) -> Result<String, CompileError> {
        match self.current.kind.clone() {
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Repeat => self.repeat_stmt(),
            TokenKind::Begin => self.compound_stmt(),
            TokenKind::Writeln => self.writeln_stmt(),
            TokenKind::Readln => self.readln_stmt(),
            TokenKind::Ident(_) => self.ident_led_stmt(),
            other => Err(SyntaxError {
                message: format!("unexpected token {other} at start of statement"),
                line: self.line(),
            }
            .into()),
        }
    }

    /// Disambiguates an identifier-led statement: assignment, a bare
    /// procedure call, or a call with an argument list.
    fn ident_led_stmt(&mut self) -> Result<String, CompileError> {
        let (name, line) = self.expect_ident()?;
        if self.at(&TokenKind::LBracket) || self.at(&TokenKind::Assign) {
            let lvalue = self.lvalue_tail(name, line)?;
            self.expect(TokenKind::Assign)?;
            let assign_line = self.line();
            let rhs = self.expr()?;
            return self.assign_stmt(lvalue, rhs, assign_line);
        }
        if self.at(&TokenKind::LParen) {
            self.bump()?;
            let args = self.arg_list_opt(TokenKind::RParen)?;
            self.expect(TokenKind::RParen)?;
            return self.proc_call_with_args(&name, line, args);
        }
        self.proc_call_bare(&name, line)
    }

    fn assign_stmt(&mut self, lvalue: LValue, rhs: ExprFragment, line: usize) -> Result<String, CompileError> {
        if let Some(sub) = self.ctx.current_subprog() {
            if sub.is_function && !lvalue.indexed && lvalue.name == sub.name {
                self.ctx.mark_return_assigned();
            }
        }

        if !lvalue.indexed {
            if let Some(reason) = self.ctx.symtab.readonly_reason(&lvalue.name) {
                return Err(readonly_error(&lvalue.name, reason, line));
            }
        }

        if lvalue.ty.is_array() {
            return self.semerr("cannot assign directly to an entire array (missing index)");
        }

        if !assign_compat(&lvalue.ty, &rhs.ty) {
            return self.semerr(format!(
                "incompatible assignment: {} := {}",
                lvalue.ty, rhs.ty
            ));
        }

        let info = self
            .ctx
            .symtab
            .lookup(&lvalue.name)
            .expect("lvalue name was already resolved")
            .clone();

        if !lvalue.indexed {
            let mut code = rhs.code;
            code.push_str(&gen_store_var(&info));
            return Ok(code);
        }

        let (lo, hi) = match &info {
            SymbolEntry::Var { ty: Type::Array { lo, hi, .. }, .. } => (*lo, *hi),
            _ => return self.semerr(format!("'{}' is not an array", lvalue.name)),
        };

        let mut code = String::new();
        code.push_str(&gen_load_var(&info));
        code.push_str(&lvalue.index_expr.expect("indexed lvalue always carries an index").code);
        code.push_str(&Instruction::Check(lo, hi).to_string());
        code.push('\n');
        if lo != 0 {
            code.push_str(&format!("{}\n{}\n", Instruction::PushI(lo), Instruction::Sub));
        }
        code.push_str(&rhs.code);
        code.push_str(&Instruction::StoreN.to_string());
        code.push('\n');
        Ok(code)
    }

    /// `if_stmt : IF expr THEN stmt (ELSE stmt)?`
    fn if_stmt(&mut self) -> Result<String, CompileError> {
        self.expect(TokenKind::If)?;
        let line = self.line();
        let cond = self.expr()?;
        if cond.ty != Type::Boolean {
            return Err(SemanticError::new(
                format!("IF requires a boolean condition, got {}", cond.ty),
                line,
            )
            .into());
        }
        self.expect(TokenKind::Then)?;
        let then_code = self.stmt()?;

        if self.at(&TokenKind::Else) {
            self.bump()?;
            let else_label = self.ctx.emitter.new_label("IFELSE");
            let end_label = self.ctx.emitter.new_label("IFEND");
            let else_code = self.stmt()?;
            let mut code = cond.code;
            code.push_str(&Instruction::Jz(else_label.clone()).to_string());
            code.push('\n');
            code.push_str(&then_code);
            code.push_str(&Instruction::Jump(end_label.clone()).to_string());
            code.push('\n');
            code.push_str(&format!("{else_label}:\n"));
            code.push_str(&else_code);
            code.push_str(&format!("{end_label}:\n"));
            Ok(code)
        } else {
            let end_label = self.ctx.emitter.new_label("IFEND");
            let mut code = cond.code;
            code.push_str(&Instruction::Jz(end_label.clone()).to_string());
            code.push('\n');
            code.push_str(&then_code);
            code.push_str(&format!("{end_label}:\n"));
            Ok(code)
        }
    }

    /// `while_stmt : WHILE expr DO stmt`
    fn while_stmt(&mut self) -> Result<String, CompileError> {
        self.expect(TokenKind::While)?;
        let line = self.line();
        let cond = self.expr()?;
        if cond.ty != Type::Boolean {
            return Err(SemanticError::new(
                format!("WHILE requires a boolean condition, got {}", cond.ty),
                line,
            )
            .into());
        }
        self.expect(TokenKind::Do)?;
        let start_label = self.ctx.emitter.new_label("WSTART");
        let end_label = self.ctx.emitter.new_label("WEND");
        let body_code = self.stmt()?;

        let mut code = format!("{start_label}:\n");
        code.push_str(&cond.code);
        code.push_str(&Instruction::Jz(end_label.clone()).to_string());
        code.push('\n');
        code.push_str(&body_code);
        code.push_str(&Instruction::Jump(start_label).to_string());
        code.push('\n');
        code.push_str(&format!("{end_label}:\n"));
        Ok(code)
    }

    /// `for_stmt : FOR ID ASSIGN expr (TO|DOWNTO) expr DO stmt`
    fn for_stmt(&mut self) -> Result<String, CompileError> {
        self.expect(TokenKind::For)?;
        let (varname, id_line) = self.expect_ident()?;
        self.expect(TokenKind::Assign)?;
        let start = self.expr()?;
        let to_downto = match self.current.kind {
            TokenKind::To => {
                self.bump()?;
                true
            }
            TokenKind::Downto => {
                self.bump()?;
                false
            }
            _ => {
                return Err(SyntaxError {
                    message: "expected TO or DOWNTO in FOR statement".to_string(),
                    line: self.line(),
                }
                .into())
            }
        };
        let end = self.expr()?;
        self.expect(TokenKind::Do)?;

        let info = self
            .ctx
            .symtab
            .lookup(&varname)
            .ok_or_else(|| SemanticError::new(format!("variable '{varname}' used in FOR without being declared"), id_line))?
            .clone();
        let var_ty = match &info {
            SymbolEntry::Var { ty, .. } => ty.clone(),
            _ => return Err(SemanticError::new(format!("'{varname}' in FOR is not a variable"), id_line).into()),
        };
        if var_ty != Type::Integer {
            return Err(SemanticError::new(
                format!("FOR control variable must be integer, got {var_ty}"),
                id_line,
            )
            .into());
        }
        if start.ty != Type::Integer {
            return Err(SemanticError::new(format!("FOR start value must be integer, got {}", start.ty), id_line).into());
        }
        if end.ty != Type::Integer {
            return Err(SemanticError::new(format!("FOR end value must be integer, got {}", end.ty), id_line).into());
        }

        let start_label = self.ctx.emitter.new_label("FORSTART");
        let body_label = self.ctx.emitter.new_label("FORBODY");
        let end_label = self.ctx.emitter.new_label("FOREND");

        self.ctx.symtab.readonly_enter(&varname, ReadonlyReason::ForControl);
        let body_result = self.stmt();
        self.ctx.symtab.readonly_exit(&varname);
        let body_code = body_result?;

        let mut code = String::new();
        code.push_str(&start.code);
        code.push_str(&gen_store_var(&info));

        code.push_str(&format!("{start_label}:\n"));
        code.push_str(&gen_load_var(&info));
        code.push_str(&end.code);
        code.push_str(&(if to_downto { Instruction::Sup } else { Instruction::Inf }).to_string());
        code.push('\n');
        code.push_str(&Instruction::Jz(body_label.clone()).to_string());
        code.push('\n');
        code.push_str(&Instruction::Jump(end_label.clone()).to_string());
        code.push('\n');

        code.push_str(&format!("{body_label}:\n"));
        code.push_str(&body_code);

        code.push_str(&gen_load_var(&info));
        code.push_str(&Instruction::PushI(1).to_string());
        code.push('\n');
        code.push_str(&(if to_downto { Instruction::Add } else { Instruction::Sub }).to_string());
        code.push('\n');
        code.push_str(&gen_store_var(&info));

        code.push_str(&Instruction::Jump(start_label).to_string());
        code.push('\n');
        code.push_str(&format!("{end_label}:\n"));
        Ok(code)
    }

    /// `repeat_stmt : REPEAT stmt_list UNTIL expr`
    fn repeat_stmt(&mut self) -> Result<String, CompileError> {
        self.expect(TokenKind::Repeat)?;
        let start_label = self.ctx.emitter.new_label("RSTART");
        let mut body_code = String::new();
        if !self.at(&TokenKind::Until) {
            body_code.push_str(&self.stmt()?);
            while self.at(&TokenKind::Semicolon) {
                self.bump()?;
                if self.at(&TokenKind::Until) {
                    break;
                }
                body_code.push_str(&self.stmt()?);
            }
        }
        self.expect(TokenKind::Until)?;
        let line = self.line();
        let cond = self.expr()?;
        if cond.ty != Type::Boolean {
            return Err(SemanticError::new(format!("UNTIL requires a boolean condition, got {}", cond.ty), line).into());
        }

        let mut code = format!("{start_label}:\n");
        code.push_str(&body_code);
        code.push_str(&cond.code);
        code.push_str(&Instruction::Jz(start_label).to_string());
        code.push('\n');
        Ok(code)
    }

    // ---- l-values -------------------------------------------------------

    /// Resolves `ID` or `ID [ expr ]` once the leading ID has been consumed.
    fn lvalue_tail(&mut self, name: String, line: usize) -> Result<LValue, CompileError> {
        let index_expr = if self.at(&TokenKind::LBracket) {
            self.bump()?;
            let idx = self.expr()?;
            self.expect(TokenKind::RBracket)?;
            Some(idx)
        } else {
            None
        };
        self.resolve_var_or_index(&name, index_expr, line)
    }

    fn resolve_var_or_index(
        &mut self,
        name: &str,
        index_expr: Option<ExprFragment>,
        line: usize,
    ) -> Result<LValue, CompileError> {
        let info = self
            .ctx
            .symtab
            .lookup(name)
            .ok_or_else(|| SemanticError::new(format!("variable '{name}' used without being declared"), line))?
            .clone();
        let base_ty = match &info {
            SymbolEntry::Var { ty, .. } => ty.clone(),
            other => {
                return Err(SemanticError::new(format!("'{name}' is not a variable (it is a {})", other.kind_name()), line).into())
            }
        };

        let Some(index_expr) = index_expr else {
            return Ok(LValue {
                name: name.to_string(),
                ty: base_ty,
                indexed: false,
                index_expr: None,
                string_indexed: false,
            });
        };

        if index_expr.ty != Type::Integer {
            return Err(SemanticError::new(
                format!("index of '{name}[...]' must be integer, got {}", index_expr.ty),
                line,
            )
            .into());
        }

        if base_ty == Type::String {
            return Ok(LValue {
                name: name.to_string(),
                ty: Type::Char,
                indexed: true,
                index_expr: Some(Box::new(index_expr)),
                string_indexed: true,
            });
        }

        let Type::Array { lo, hi, element } = &base_ty else {
            return Err(SemanticError::new(
                format!("'{name}' is neither array nor string, cannot be indexed with [ ] (type: {base_ty})"),
                line,
            )
            .into());
        };

        if let Some(ConstValue::Int(c)) = index_expr.const_value {
            if c < *lo || c > *hi {
                return Err(SemanticError::new(
                    format!("index out of range: '{name}[{c}]' but the array is {base_ty}"),
                    line,
                )
                .into());
            }
        }

        Ok(LValue {
            name: name.to_string(),
            ty: (**element).clone(),
            indexed: true,
            index_expr: Some(Box::new(index_expr)),
            string_indexed: false,
        })
    }

    // ---- I/O and procedure calls ----------------------------------------

    /// `WRITELN (LPAREN arg_list? RPAREN)?`
    fn writeln_stmt(&mut self) -> Result<String, CompileError> {
        self.expect(TokenKind::Writeln)?;
        let line = self.line();
        let args = if self.at(&TokenKind::LParen) {
            self.bump()?;
            let args = self.arg_list_opt(TokenKind::RParen)?;
            self.expect(TokenKind::RParen)?;
            args
        } else {
            vec![]
        };

        let mut code = String::new();
        for e in args {
            if e.ty.is_array() {
                return Err(SemanticError::new("WRITELN does not accept arrays", line).into());
            }
            code.push_str(&e.code);
            let instr = match e.ty {
                Type::Integer | Type::Boolean => Instruction::WriteI,
                Type::Real => Instruction::WriteF,
                Type::String => Instruction::WriteS,
                Type::Char => Instruction::WriteChr,
                Type::Array { .. } => unreachable!(),
            };
            code.push_str(&instr.to_string());
            code.push('\n');
        }
        code.push_str(&Instruction::Writeln.to_string());
        code.push('\n');
        Ok(code)
    }

    /// `READLN (LPAREN read_var_list RPAREN)?`
    fn readln_stmt(&mut self) -> Result<String, CompileError> {
        self.expect(TokenKind::Readln)?;
        let line = self.line();
        let mut targets = Vec::new();
        if self.at(&TokenKind::LParen) {
            self.bump()?;
            loop {
                let (name, id_line) = self.expect_ident()?;
                targets.push(self.lvalue_tail(name, id_line)?);
                if self.at(&TokenKind::Comma) {
                    self.bump()?;
                } else {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        }

        let mut code = String::new();
        for lv in targets {
            let info = self
                .ctx
                .symtab
                .lookup(&lv.name)
                .expect("readln target was already resolved")
                .clone();

            if lv.ty.is_array() && !lv.indexed {
                return Err(SemanticError::new("READLN cannot read into an entire array", line).into());
            }

            if !lv.indexed {
                if let Some(reason) = self.ctx.symtab.readonly_reason(&lv.name) {
                    return Err(readonly_error(&lv.name, reason, line));
                }
                code.push_str(&Instruction::Read.to_string());
                code.push('\n');
                match lv.ty {
                    Type::Integer => {
                        code.push_str(&Instruction::AtoI.to_string());
                        code.push('\n');
                    }
                    Type::Real => {
                        code.push_str(&Instruction::AtoF.to_string());
                        code.push('\n');
                    }
                    _ => {}
                }
                code.push_str(&gen_store_var(&info));
            } else {
                if lv.string_indexed {
                    return Err(SemanticError::new(
                        format!("READLN cannot read into '{}[...]' because it is a string (read-only)", lv.name),
                        line,
                    )
                    .into());
                }
                let (lo, hi) = match &info {
                    SymbolEntry::Var { ty: Type::Array { lo, hi, .. }, .. } => (*lo, *hi),
                    _ => return Err(SemanticError::new("internal error: indexed READLN target is not an array", line).into()),
                };
                code.push_str(&gen_load_var(&info));
                code.push_str(&lv.index_expr.expect("indexed lvalue carries an index").code);
                code.push_str(&Instruction::Check(lo, hi).to_string());
                code.push('\n');
                if lo != 0 {
                    code.push_str(&format!("{}\n{}\n", Instruction::PushI(lo), Instruction::Sub));
                }
                code.push_str(&Instruction::Read.to_string());
                code.push('\n');
                match lv.ty {
                    Type::Integer => {
                        code.push_str(&Instruction::AtoI.to_string());
                        code.push('\n');
                    }
                    Type::Real => {
                        code.push_str(&Instruction::AtoF.to_string());
                        code.push('\n');
                    }
                    _ => {}
                }
                code.push_str(&Instruction::StoreN.to_string());
                code.push('\n');
            }
        }
        Ok(code)
    }

    /// A bare procedure-call statement: `ID` with no argument list.
    fn proc_call_bare(&mut self, name: &str, line: usize) -> Result<String, CompileError> {
        let info = self.lookup_proc(name, line)?;
        let (label, arity) = match &info {
            SymbolEntry::Proc { params, label } => (label.clone(), params.len()),
            _ => unreachable!(),
        };
        if arity != 0 {
            return Err(SemanticError::new(format!("procedure '{name}' requires {arity} args; use '{name}(...)'"), line).into());
        }
        Ok(format!("{}\n{}\n", Instruction::PushA(label), Instruction::Call))
    }

    fn proc_call_with_args(&mut self, name: &str, line: usize, args: Vec<ExprFragment>) -> Result<String, CompileError> {
        let info = self.lookup_proc(name, line)?;
        let (label, params) = match &info {
            SymbolEntry::Proc { params, label } => (label.clone(), params.clone()),
            _ => unreachable!(),
        };
        if args.len() != params.len() {
            return Err(SemanticError::new(
                format!("'{name}' expects {} args, got {}: {}", params.len(), args.len(), crate::types::fmt_sig_args(&args.iter().map(|a| a.ty.clone()).collect::<Vec<_>>())),
                line,
            )
            .into());
        }
        for (i, (arg, param)) in args.iter().zip(params.iter()).enumerate() {
            if !assign_compat(&param.ty, &arg.ty) {
                return Err(SemanticError::new(
                    format!("arg {} of '{name}' is incompatible: expected {}, got {}", i + 1, param.ty, arg.ty),
                    line,
                )
                .into());
            }
        }

        let mut code = String::new();
        for (arg, param) in args.iter().zip(params.iter()) {
            code.push_str(&arg.code);
            if param.ty == Type::Real && arg.ty == Type::Integer {
                code.push_str(&Instruction::ItoF.to_string());
                code.push('\n');
            }
        }
        code.push_str(&format!("{}\n{}\n", Instruction::PushA(label), Instruction::Call));
        code.push_str(&Instruction::Pop(args.len() as i64).to_string());
        code.push('\n');
        Ok(code)
    }

    fn lookup_proc(&self, name: &str, line: usize) -> Result<SymbolEntry, CompileError> {
        let info = self
            .ctx
            .symtab
            .lookup(name)
            .ok_or_else(|| SemanticError::new(format!("'{name}' called without being declared"), line))?
            .clone();
        match &info {
            SymbolEntry::Proc { .. } => Ok(info),
            SymbolEntry::Var { .. } => Err(SemanticError::new(format!("'{name}' is a variable and cannot be called as a procedure"), line).into()),
            SymbolEntry::Func { .. } => Err(SemanticError::new(format!("function '{name}' cannot be called as a statement; use its value in an expression"), line).into()),
            SymbolEntry::BuiltinFunc => Err(SemanticError::new(format!("builtin function '{name}' cannot be called as a statement; use its value in an expression"), line).into()),
        }
    }

    /// `arg_list_opt : (expr (COMMA expr)*)?`, stopping at `stop`.
    fn arg_list_opt(&mut self, stop: TokenKind) -> Result<Vec<ExprFragment>, CompileError> {
        let mut args = Vec::new();
        if self.at(&stop) {
            return Ok(args);
        }
        args.push(self.expr()?);
        while self.at(&TokenKind::Comma) {
            self.bump()?;
            args.push(self.expr()?);
        }
        Ok(args)
    }
}

fn readonly_error(name: &str, reason: ReadonlyReason, line: usize) -> CompileError {
    let message = match reason {
        ReadonlyReason::ForControl => format!("cannot assign to FOR control variable '{name}'"),
        ReadonlyReason::Other => format!("cannot modify read-only variable '{name}'"),
    };
    SemanticError::new(message, line).into()
}

pub(crate) fn register_builtins(ctx: &mut CompilerContext) {
    for name in crate::types::BUILTIN_FUNCS.keys() {
        ctx.symtab
            .declare(name, SymbolEntry::BuiltinFunc, true)
            .expect("builtins are declared once into an empty global scope");
    }
}
