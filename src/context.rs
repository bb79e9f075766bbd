//! The compiler's shared mutable state: address counters, the
//! accumulating code buckets, the pending-subprogram-header latch, and
//! the active-subprogram stack used to validate function returns and
//! FOR-loop read-only variables.

use crate::asm::Emitter;
use crate::symtab::{Param, SymbolTable};
use crate::types::Type;

#[derive(Debug, Clone)]
pub struct PendingHeader {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<Type>,
    pub line: usize,
}

/// One active subprogram: its kind, name, declaration line, and
/// signature. The signature is kept here (not just looked up through
/// the symbol table) because a function's own local scope shadows its
/// name with its return-slot variable, so a recursive call site cannot
/// resolve the function's signature through a normal lookup.
#[derive(Debug, Clone)]
pub struct ActiveSubprog {
    pub is_function: bool,
    pub name: String,
    pub line: usize,
    pub params: Vec<Param>,
    pub ret: Option<Type>,
}

impl ActiveSubprog {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

pub struct CompilerContext {
    pub symtab: SymbolTable,
    pub emitter: Emitter,

    pub next_global_addr: i64,
    next_local_addr_stack: Vec<i64>,
    local_init_code_stack: Vec<String>,

    pub global_init_code: String,
    pub subprog_code: String,

    pending_header: Option<PendingHeader>,
    current_subprog: Vec<ActiveSubprog>,
    func_return_assigned: Vec<bool>,
}

impl CompilerContext {
    pub fn new() -> Self {
        Self {
            symtab: SymbolTable::new(),
            emitter: Emitter::new(),
            next_global_addr: 0,
            next_local_addr_stack: Vec::new(),
            local_init_code_stack: Vec::new(),
            global_init_code: String::new(),
            subprog_code: String::new(),
            pending_header: None,
            current_subprog: Vec::new(),
            func_return_assigned: Vec::new(),
        }
    }

    /// Clears all per-compilation state, keeping the (now empty) symbol
    /// table and emitter instances themselves. Not exercised by
    /// `compile`, which builds a fresh context per call (see
    /// SPEC_FULL.md, Open Question 3); kept for a host that wants to
    /// reuse one context across many compilations.
    pub fn reset(&mut self) {
        self.symtab = SymbolTable::new();
        self.emitter = Emitter::new();
        self.next_global_addr = 0;
        self.next_local_addr_stack.clear();
        self.local_init_code_stack.clear();
        self.global_init_code.clear();
        self.subprog_code.clear();
        self.pending_header = None;
        self.current_subprog.clear();
        self.func_return_assigned.clear();
    }

    pub fn set_pending_header(&mut self, header: PendingHeader) {
        self.pending_header = Some(header);
    }

    pub fn take_pending_header(&mut self) -> Option<PendingHeader> {
        self.pending_header.take()
    }

    pub fn enter_subprogram(&mut self, initial_local_addr: i64) {
        self.next_local_addr_stack.push(initial_local_addr);
        self.local_init_code_stack.push(String::new());
    }

    pub fn next_local_addr(&self) -> i64 {
        *self
            .next_local_addr_stack
            .last()
            .expect("declaration outside any subprogram")
    }

    pub fn alloc_local_addr(&mut self) -> i64 {
        let slot = self
            .next_local_addr_stack
            .last_mut()
            .expect("declaration outside any subprogram");
        let addr = *slot;
        *slot += 1;
        addr
    }

    pub fn append_local_init(&mut self, code: &str) {
        self.local_init_code_stack
            .last_mut()
            .expect("array declared outside any subprogram")
            .push_str(code);
    }

    pub fn exit_subprogram(&mut self) -> (i64, String) {
        let nlocals = self
            .next_local_addr_stack
            .pop()
            .expect("exit_subprogram without enter_subprogram");
        let init = self
            .local_init_code_stack
            .pop()
            .expect("exit_subprogram without enter_subprogram");
        (nlocals, init)
    }

    pub fn push_active_subprog(&mut self, subprog: ActiveSubprog) {
        if subprog.is_function {
            self.func_return_assigned.push(false);
        }
        self.current_subprog.push(subprog);
    }

    pub fn pop_active_subprog(&mut self) -> ActiveSubprog {
        let s = self
            .current_subprog
            .pop()
            .expect("pop_active_subprog without a matching push");
        if s.is_function {
            self.func_return_assigned.pop();
        }
        s
    }

    pub fn current_subprog(&self) -> Option<&ActiveSubprog> {
        self.current_subprog.last()
    }

    pub fn mark_return_assigned(&mut self) {
        if let Some(flag) = self.func_return_assigned.last_mut() {
            *flag = true;
        }
    }

    pub fn is_return_assigned(&self) -> bool {
        self.func_return_assigned.last().copied().unwrap_or(false)
    }
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new()
    }
}
