//! Lexical scopes and ownership of reference-counted locals.
//!
//! Every frame keeps a stack of scopes. A scope records, in declaration
//! order, the named locals and the owned temporaries created inside it.
//! Leaving a scope releases the managed values it still owns, newest
//! first. Parameters are borrowed and never released by the callee.

/// What a scope entry tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Local {
        name: String,
        used: bool,
        initialized: bool,
        param: bool,
    },
    /// An owned value with no name yet (result of `new` or a call).
    Temporary { live: bool },
}

/// One tracked register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeEntry {
    pub reg: u32,
    pub kind: EntryKind,
}

impl ScopeEntry {
    /// Whether the frame currently owns the value in this register.
    pub fn owns(&self) -> bool {
        match &self.kind {
            EntryKind::Local {
                initialized, param, ..
            } => *initialized && !*param,
            EntryKind::Temporary { live } => *live,
        }
    }

    /// Name of a local that was declared but never read.
    pub fn unused_name(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::Local {
                name,
                used: false,
                param: false,
                ..
            } if !name.starts_with('_') => Some(name.as_str()),
            _ => None,
        }
    }
}

/// Scope stack of one frame. The outermost scope is the function scope.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    scopes: Vec<Vec<ScopeEntry>>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![Vec::new()],
        }
    }

    /// Number of open scopes, including the function scope.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Close the innermost block scope. The function scope is closed with
    /// [`ScopeStack::close_function`] instead.
    pub fn pop(&mut self) -> Option<Vec<ScopeEntry>> {
        if self.scopes.len() <= 1 {
            return None;
        }
        self.scopes.pop()
    }

    /// Close the function scope; only valid once every block is closed.
    pub fn close_function(&mut self) -> Option<Vec<ScopeEntry>> {
        if self.scopes.len() != 1 {
            return None;
        }
        self.scopes.pop()
    }

    fn innermost(&mut self) -> &mut Vec<ScopeEntry> {
        if self.scopes.is_empty() {
            self.scopes.push(Vec::new());
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    pub fn declare_local(&mut self, reg: u32, name: impl Into<String>) {
        self.innermost().push(ScopeEntry {
            reg,
            kind: EntryKind::Local {
                name: name.into(),
                used: false,
                initialized: false,
                param: false,
            },
        });
    }

    pub fn declare_param(&mut self, reg: u32, name: impl Into<String>) {
        self.innermost().push(ScopeEntry {
            reg,
            kind: EntryKind::Local {
                name: name.into(),
                used: false,
                initialized: true,
                param: true,
            },
        });
    }

    pub fn add_temporary(&mut self, reg: u32) {
        self.innermost().push(ScopeEntry {
            reg,
            kind: EntryKind::Temporary { live: true },
        });
    }

    fn entries(&self) -> impl Iterator<Item = &ScopeEntry> {
        self.scopes.iter().rev().flat_map(|scope| scope.iter().rev())
    }

    fn entry_mut(&mut self, reg: u32) -> Option<&mut ScopeEntry> {
        self.scopes
            .iter_mut()
            .rev()
            .flat_map(|scope| scope.iter_mut().rev())
            .find(|entry| entry.reg == reg)
    }

    /// Register of the innermost local with this name.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.entries()
            .find(|entry| matches!(&entry.kind, EntryKind::Local { name: n, .. } if n == name))
            .map(|entry| entry.reg)
    }

    /// Names of every visible local.
    pub fn local_names(&self) -> Vec<&str> {
        self.entries()
            .filter_map(|entry| match &entry.kind {
                EntryKind::Local { name, .. } => Some(name.as_str()),
                EntryKind::Temporary { .. } => None,
            })
            .collect()
    }

    pub fn entry(&self, reg: u32) -> Option<&ScopeEntry> {
        self.entries().find(|entry| entry.reg == reg)
    }

    pub fn is_local(&self, reg: u32) -> bool {
        matches!(
            self.entry(reg),
            Some(ScopeEntry {
                kind: EntryKind::Local { .. },
                ..
            })
        )
    }

    pub fn mark_used(&mut self, reg: u32) {
        if let Some(ScopeEntry {
            kind: EntryKind::Local { used, .. },
            ..
        }) = self.entry_mut(reg)
        {
            *used = true;
        }
    }

    pub fn mark_initialized(&mut self, reg: u32) {
        if let Some(ScopeEntry {
            kind: EntryKind::Local { initialized, .. },
            ..
        }) = self.entry_mut(reg)
        {
            *initialized = true;
        }
    }

    pub fn is_initialized(&self, reg: u32) -> bool {
        matches!(
            self.entry(reg),
            Some(ScopeEntry {
                kind: EntryKind::Local {
                    initialized: true,
                    ..
                },
                ..
            })
        )
    }

    /// Whether the frame owns the value held in `reg`.
    pub fn owns(&self, reg: u32) -> bool {
        self.entry(reg).is_some_and(ScopeEntry::owns)
    }

    /// Whether `reg` holds an owned temporary that has not been moved.
    pub fn is_live_temporary(&self, reg: u32) -> bool {
        matches!(
            self.entry(reg),
            Some(ScopeEntry {
                kind: EntryKind::Temporary { live: true },
                ..
            })
        )
    }

    /// Give up ownership without releasing: a moved temporary or a
    /// returned local.
    pub fn forget(&mut self, reg: u32) {
        match self.entry_mut(reg) {
            Some(ScopeEntry {
                kind: EntryKind::Temporary { live },
                ..
            }) => *live = false,
            Some(ScopeEntry {
                kind: EntryKind::Local { initialized, .. },
                ..
            }) => *initialized = false,
            None => {}
        }
    }

    /// Every owned register in every open scope, newest first.
    pub fn owned(&self) -> Vec<u32> {
        self.entries()
            .filter(|entry| entry.owns())
            .map(|entry| entry.reg)
            .collect()
    }
}

/// Owned registers of a closed scope in release order (newest first),
/// filtered to ownership-managed values. The first error from `managed`
/// aborts.
pub fn release_order<F, E>(entries: &[ScopeEntry], mut managed: F) -> Result<Vec<u32>, E>
where
    F: FnMut(u32) -> Result<bool, E>,
{
    let mut order = Vec::new();
    for entry in entries.iter().rev().filter(|entry| entry.owns()) {
        if managed(entry.reg)? {
            order.push(entry.reg);
        }
    }
    Ok(order)
}
