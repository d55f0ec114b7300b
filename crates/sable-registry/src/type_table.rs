//! Type table - persistent per-slot type records plus one speculative layer.
//!
//! Every declaration owns a run of slots (`local` 1 is the return type,
//! registers start at 2). While a declaration body is being instantiated a
//! layer scoped to that declaration shadows its persistent records:
//! reads for that declaration go through the layer when the slot has been
//! substituted, everything else reads persistent storage. A successful walk
//! commits the layer, a failed one discards it. Layers nest strictly: opening
//! a layer parks the previous one inside the returned [`LayerScope`] token and
//! closing it restores that layer.

use rustc_hash::FxHashMap;
use sable_core::{DeclId, InternalError, Qualifiers, RegistrationError, SlotId, TypeKind, TypeRecord};

/// Speculative records of the declaration being instantiated.
#[derive(Debug, Clone)]
struct Layer {
    decl: DeclId,
    /// Indexed by local id; `Some` once substituted.
    slots: Vec<Option<TypeRecord>>,
    /// Locals bound by the signature; never merged.
    pinned: Vec<u32>,
}

impl Layer {
    fn is_substituted(&self, local: u32) -> bool {
        matches!(self.slots.get(local as usize), Some(Some(_)))
    }
}

/// Token for one layer activation.
///
/// Must be handed back to [`TypeTable::commit`] or [`TypeTable::discard`].
#[must_use = "a layer must be committed or discarded"]
#[derive(Debug)]
pub struct LayerScope {
    decl: DeclId,
    previous: Option<Layer>,
    armed: bool,
}

impl LayerScope {
    /// Declaration the layer belongs to.
    pub fn decl(&self) -> DeclId {
        self.decl
    }
}

impl Drop for LayerScope {
    fn drop(&mut self) {
        if self.armed && !std::thread::panicking() {
            debug_assert!(
                false,
                "layer for {} dropped without commit or discard",
                self.decl
            );
        }
    }
}

/// Persistent type records keyed by slot, plus the active layer.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    /// Index 0 of every run is a placeholder for the invalid local.
    persistent: FxHashMap<DeclId, Vec<TypeRecord>>,
    layer: Option<Layer>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate `count` fresh records for a declaration (locals `1..=count`).
    pub fn bulk_create(&mut self, decl: DeclId, count: u32) -> Result<(), RegistrationError> {
        if self.persistent.contains_key(&decl) {
            return Err(RegistrationError::DuplicateSlots(decl));
        }
        let mut records = Vec::with_capacity(count as usize + 1);
        records.push(TypeRecord::void());
        records.extend((0..count).map(|_| TypeRecord::fresh()));
        self.persistent.insert(decl, records);
        Ok(())
    }

    /// Append `count` fresh records, returning the first new local id.
    pub fn bulk_append(&mut self, decl: DeclId, count: u32) -> u32 {
        let records = self
            .persistent
            .entry(decl)
            .or_insert_with(|| vec![TypeRecord::void()]);
        let first = records.len() as u32;
        records.extend((0..count).map(|_| TypeRecord::fresh()));
        first
    }

    /// Number of allocated locals of a declaration.
    pub fn slot_count(&self, decl: DeclId) -> u32 {
        self.persistent
            .get(&decl)
            .map(|records| records.len().saturating_sub(1) as u32)
            .unwrap_or(0)
    }

    /// Copy every persistent record of `from` to `to`, re-pointing slot
    /// references and links through `remap`.
    pub fn clone_slots(
        &mut self,
        from: DeclId,
        to: DeclId,
        remap: &FxHashMap<DeclId, DeclId>,
    ) -> Result<(), InternalError> {
        let records = self
            .persistent
            .get(&from)
            .ok_or(InternalError::MissingSlot(from.return_slot()))?
            .iter()
            .map(|record| remap_record(record, remap))
            .collect();
        self.persistent.insert(to, records);
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    fn lookup(&self, slot: SlotId, through_layer: bool) -> Result<&TypeRecord, InternalError> {
        if !slot.is_valid() {
            return Err(InternalError::MissingSlot(slot));
        }
        if through_layer {
            if let Some(layer) = &self.layer {
                if layer.decl == slot.decl {
                    if let Some(Some(record)) = layer.slots.get(slot.local as usize) {
                        return Ok(record);
                    }
                }
            }
        }
        self.persistent
            .get(&slot.decl)
            .and_then(|records| records.get(slot.local as usize))
            .ok_or(InternalError::MissingSlot(slot))
    }

    fn follow(&self, slot: SlotId, through_layer: bool) -> Result<&TypeRecord, InternalError> {
        let record = self.lookup(slot, through_layer)?;
        match record.alias {
            Some(target) => self.lookup(target, through_layer),
            None => Ok(record),
        }
    }

    /// Read a slot through the active layer, following one alias hop.
    pub fn read(&self, slot: SlotId) -> Result<&TypeRecord, InternalError> {
        self.follow(slot, true)
    }

    /// Read persistent storage only, following one alias hop.
    pub fn raw_read(&self, slot: SlotId) -> Result<&TypeRecord, InternalError> {
        self.follow(slot, false)
    }

    /// The slot a read of `slot` actually lands on.
    pub fn resolve_alias(&self, slot: SlotId) -> Result<SlotId, InternalError> {
        Ok(self.lookup(slot, true)?.alias.unwrap_or(slot))
    }

    /// Whether the slot exists in the layer or persistent storage.
    pub fn contains(&self, slot: SlotId) -> bool {
        self.lookup(slot, true).is_ok()
    }

    /// Effective record of a slot.
    ///
    /// An `any` record with `extends` resolves one level to the unique
    /// concrete record reachable from it; otherwise the record itself.
    pub fn resolve(&self, slot: SlotId) -> Result<&TypeRecord, InternalError> {
        let record = self.read(slot)?;
        if !record.is_any() || record.extends.is_empty() {
            return Ok(record);
        }
        let mut found: Option<&TypeRecord> = None;
        for &target in &record.extends {
            let candidate = self.read(target)?;
            if candidate.is_any() {
                continue;
            }
            match found {
                None => found = Some(candidate),
                Some(previous) if previous.key() == candidate.key() => {}
                Some(_) => return Ok(record),
            }
        }
        Ok(found.unwrap_or(record))
    }

    /// Declaration a record refers to, following at most one level of
    /// `extends`. More than one distinct reachable declaration is unresolved.
    pub fn resolve_decl(&self, record: &TypeRecord) -> Option<DeclId> {
        if let TypeKind::Linked(decl) = record.kind {
            return Some(decl);
        }
        let mut found = None;
        for &target in &record.extends {
            let Some(decl) = self.read(target).ok().and_then(|r| r.kind.linked()) else {
                continue;
            };
            match found {
                None => found = Some(decl),
                Some(previous) if previous == decl => {}
                Some(_) => return None,
            }
        }
        found
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Write a record through the current view: into the layer for the active
    /// declaration, into persistent storage otherwise.
    pub fn set(&mut self, slot: SlotId, record: TypeRecord) -> Result<(), InternalError> {
        if self.active_decl() == Some(slot.decl) {
            *self.substitute_mut(slot.local)? = record;
            return Ok(());
        }
        if !slot.is_valid() {
            return Err(InternalError::MissingSlot(slot));
        }
        let target = self
            .persistent
            .get_mut(&slot.decl)
            .and_then(|records| records.get_mut(slot.local as usize))
            .ok_or(InternalError::MissingSlot(slot))?;
        *target = record;
        Ok(())
    }

    /// Alias `target` to whatever `source` lands on.
    pub fn make_hardlink(&mut self, source: SlotId, target: SlotId) -> Result<(), InternalError> {
        let source = self.resolve_alias(source)?;
        self.set(target, TypeRecord::alias_of(source))
    }

    // ========================================================================
    // Layers
    // ========================================================================

    /// Declaration of the active layer.
    pub fn active_decl(&self) -> Option<DeclId> {
        self.layer.as_ref().map(|layer| layer.decl)
    }

    /// Open a layer for `decl`, parking the current one in the token.
    pub fn begin_layer(&mut self, decl: DeclId) -> LayerScope {
        let count = self
            .persistent
            .get(&decl)
            .map(|records| records.len())
            .unwrap_or(1);
        let layer = Layer {
            decl,
            slots: vec![None; count],
            pinned: Vec::new(),
        };
        LayerScope {
            decl,
            previous: self.layer.replace(layer),
            armed: true,
        }
    }

    /// Merge the layer into persistent storage and restore the previous one.
    pub fn commit(&mut self, mut scope: LayerScope) -> Result<(), InternalError> {
        self.check_active(&scope)?;
        self.merge();
        self.layer = scope.previous.take();
        scope.armed = false;
        Ok(())
    }

    /// Drop the layer's substitutions and restore the previous one.
    pub fn discard(&mut self, mut scope: LayerScope) -> Result<(), InternalError> {
        self.check_active(&scope)?;
        self.layer = scope.previous.take();
        scope.armed = false;
        Ok(())
    }

    fn check_active(&self, scope: &LayerScope) -> Result<(), InternalError> {
        match self.active_decl() {
            Some(decl) if decl == scope.decl => Ok(()),
            _ => Err(InternalError::LayerMismatch(scope.decl)),
        }
    }

    /// Copy substituted records into persistent storage and invalidate the
    /// layer. Pinned slots keep their persistent record.
    fn merge(&mut self) {
        let Some(layer) = self.layer.take() else {
            return;
        };
        let records = self
            .persistent
            .entry(layer.decl)
            .or_insert_with(|| vec![TypeRecord::void()]);
        for (local, record) in layer.slots.into_iter().enumerate() {
            let Some(record) = record else { continue };
            if layer.pinned.contains(&(local as u32)) {
                continue;
            }
            if local >= records.len() {
                records.resize_with(local + 1, TypeRecord::fresh);
            }
            records[local] = record;
        }
    }

    fn active_layer(&mut self) -> Result<&mut Layer, InternalError> {
        self.layer
            .as_mut()
            .ok_or(InternalError::LayerMismatch(DeclId::RESERVED))
    }

    /// Claim a layer slot of the active declaration.
    ///
    /// The first call seeds a fresh record with the stored qualifiers; later
    /// calls in the same activation return the same slot untouched.
    pub fn substitute(&mut self, local: u32) -> Result<SlotId, InternalError> {
        self.substitute_mut(local)?;
        let decl = self.active_layer()?.decl;
        Ok(decl.slot(local))
    }

    /// Claim a layer slot and borrow its record.
    pub fn substitute_mut(&mut self, local: u32) -> Result<&mut TypeRecord, InternalError> {
        let decl = self.active_layer()?.decl;
        let slot = decl.slot(local);
        if !slot.is_valid() {
            return Err(InternalError::MissingSlot(slot));
        }
        let stored = self
            .persistent
            .get(&decl)
            .and_then(|records| records.get(local as usize))
            .map(|record| record.qualifiers);
        let layer = self.active_layer()?;
        if !layer.is_substituted(local) {
            let in_layer = (local as usize) < layer.slots.len();
            if !in_layer && stored.is_none() {
                return Err(InternalError::MissingSlot(slot));
            }
            if !in_layer {
                layer.slots.resize(local as usize + 1, None);
            }
            let seed = TypeRecord::fresh().with_qualifiers(stored.unwrap_or_default());
            layer.slots[local as usize] = Some(seed);
        }
        layer.slots[local as usize]
            .as_mut()
            .ok_or(InternalError::MissingSlot(slot))
    }

    /// Append a brand-new slot to the active layer.
    pub fn add_substitute(
        &mut self,
        kind: TypeKind,
        decl: DeclId,
        qualifiers: Qualifiers,
    ) -> Result<SlotId, InternalError> {
        let layer = self.active_layer()?;
        if layer.decl != decl {
            return Err(InternalError::LayerMismatch(decl));
        }
        let local = layer.slots.len() as u32;
        let mut record = TypeRecord::fresh().with_qualifiers(qualifiers);
        record.set_kind(kind);
        layer.slots.push(Some(record));
        Ok(decl.slot(local))
    }

    /// Mark a substituted slot as bound by the signature; commit leaves its
    /// persistent record untouched.
    pub fn pin(&mut self, local: u32) -> Result<(), InternalError> {
        let layer = self.active_layer()?;
        if !layer.pinned.contains(&local) {
            layer.pinned.push(local);
        }
        Ok(())
    }

    /// Whether a slot of the active declaration has been substituted.
    pub fn is_substituted(&self, slot: SlotId) -> bool {
        self.layer
            .as_ref()
            .is_some_and(|layer| layer.decl == slot.decl && layer.is_substituted(slot.local))
    }
}

fn remap_slot(slot: SlotId, remap: &FxHashMap<DeclId, DeclId>) -> SlotId {
    match remap.get(&slot.decl) {
        Some(&decl) => decl.slot(slot.local),
        None => slot,
    }
}

fn remap_record(record: &TypeRecord, remap: &FxHashMap<DeclId, DeclId>) -> TypeRecord {
    let mut record = record.clone();
    if let TypeKind::Linked(decl) = record.kind {
        if let Some(&clone) = remap.get(&decl) {
            record.kind = TypeKind::Linked(clone);
        }
    }
    for slot in &mut record.extends {
        *slot = remap_slot(*slot, remap);
    }
    record.alias = record.alias.map(|slot| remap_slot(slot, remap));
    if let Some(call) = &mut record.call {
        for candidate in &mut call.candidates {
            if let Some(&clone) = remap.get(candidate) {
                *candidate = clone;
            }
        }
    }
    record
}
