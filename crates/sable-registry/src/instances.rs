//! Per-declaration instance cache.
//!
//! Maps signature → instance. A slot is reserved before the body is walked,
//! so a recursive call to the same signature observes a present but not yet
//! valid entry. Entries are appended and never removed; failures are
//! tombstoned so a failed signature is never retried.

use rustc_hash::FxHashMap;
use sable_core::{DeclId, InstanceId, InternalError, Signature, TypeKey, TypedChunk};

/// Validity of one cached instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Validity {
    /// Compiled successfully.
    Yes,
    /// Failed; do not retry or re-report.
    No,
    /// Reserved but not compiled yet.
    Indeterminate,
}

/// One specialization of a declaration.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: InstanceId,
    pub owner: DeclId,
    pub signature: Signature,
    /// Printable symbol name; empty until compiled.
    pub symbol: String,
    pub return_type: TypeKey,
    pub code: TypedChunk,
    pub validity: Validity,
    /// Set when the signature is served by a cloned declaration.
    pub remap: Option<DeclId>,
}

/// Result of a cache probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Usable instance.
    Valid {
        id: InstanceId,
        return_type: TypeKey,
        remap: Option<DeclId>,
    },
    /// Failed before; do not retry.
    Failed,
    /// Reserved, body still being compiled.
    Pending(InstanceId),
    /// Never attempted.
    Indeterminate,
}

/// Signature-keyed instance cache of one declaration.
#[derive(Debug, Clone, Default)]
pub struct InstanceCache {
    entries: Vec<Instance>,
    by_signature: FxHashMap<Signature, usize>,
    by_id: FxHashMap<InstanceId, usize>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.entries.iter()
    }

    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.by_id.get(&id).map(|&index| &self.entries[index])
    }

    pub fn find(&self, signature: &Signature) -> Option<&Instance> {
        self.by_signature
            .get(signature)
            .map(|&index| &self.entries[index])
    }

    /// Probe the cache for a signature.
    pub fn is_valid(&self, signature: &Signature) -> Probe {
        match self.find(signature) {
            None => Probe::Indeterminate,
            Some(instance) => match instance.validity {
                Validity::Yes => Probe::Valid {
                    id: instance.id,
                    return_type: instance.return_type,
                    remap: instance.remap,
                },
                Validity::No => Probe::Failed,
                Validity::Indeterminate => Probe::Pending(instance.id),
            },
        }
    }

    /// Reserve an entry for a signature under a caller-allocated id.
    ///
    /// Returns the existing id if the signature was already reserved.
    pub fn create(&mut self, id: InstanceId, signature: Signature, owner: DeclId) -> InstanceId {
        if let Some(existing) = self.find(&signature) {
            return existing.id;
        }
        let index = self.entries.len();
        self.by_signature.insert(signature.clone(), index);
        self.by_id.insert(id, index);
        self.entries.push(Instance {
            id,
            owner,
            signature,
            symbol: String::new(),
            return_type: TypeKey::ANY,
            code: TypedChunk::new(),
            validity: Validity::Indeterminate,
            remap: None,
        });
        id
    }

    /// Mark an entry compiled.
    pub fn update(
        &mut self,
        id: InstanceId,
        symbol: String,
        return_type: TypeKey,
        code: TypedChunk,
    ) -> Result<(), InternalError> {
        let instance = self.entry_mut(id)?;
        instance.symbol = symbol;
        instance.return_type = return_type;
        instance.code = code;
        instance.validity = Validity::Yes;
        Ok(())
    }

    /// Mark an entry permanently failed.
    pub fn invalidate(&mut self, id: InstanceId) -> Result<(), InternalError> {
        let instance = self.entry_mut(id)?;
        instance.validity = Validity::No;
        instance.code = TypedChunk::new();
        Ok(())
    }

    /// Record that a signature is served by another declaration.
    pub fn create_remap(
        &mut self,
        id: InstanceId,
        signature: Signature,
        owner: DeclId,
        target: DeclId,
    ) -> InstanceId {
        let id = self.create(id, signature, owner);
        if let Some(&index) = self.by_id.get(&id) {
            let instance = &mut self.entries[index];
            instance.remap = Some(target);
            instance.return_type = TypeKey::linked(target);
            instance.validity = Validity::Yes;
        }
        id
    }

    /// Whether any entry is a remap.
    pub fn has_remaps(&self) -> bool {
        self.entries.iter().any(|instance| instance.remap.is_some())
    }

    fn entry_mut(&mut self, id: InstanceId) -> Result<&mut Instance, InternalError> {
        let index = *self
            .by_id
            .get(&id)
            .ok_or(InternalError::InvalidInstance(id))?;
        Ok(&mut self.entries[index])
    }
}
