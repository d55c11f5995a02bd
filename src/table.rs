//! Command table operations: create, lookup, rename, hide, expose, delete,
//! import and alias, plus namespace management.
//!
//! Every record belongs to exactly one table at a time: the command table of
//! a namespace or the interpreter's hidden table. Structural changes bump the
//! record's epoch and the interpreter's compile epoch, so cached references
//! (handles held by compiled scripts, for instance) can detect that they are
//! stale.

use crate::command::{CommandId, CommandImpl, CommandRecord, DeleteProc, Location};
use crate::error::EvalError;
use crate::interp::Interp;
use crate::namespace::{self, Namespaces, NsId};
use crate::pattern;
use crate::trace::{CommandTraceFn, TraceEvent, TraceId, TraceOps};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};

fn remove_entry_if(table: &mut BTreeMap<String, CommandId>, name: &str, id: CommandId) -> bool {
    if table.get(name) == Some(&id) {
        table.remove(name);
        true
    } else {
        false
    }
}

impl Interp {
    fn lookup_in(&self, ns: NsId, tail: &str) -> Option<CommandId> {
        self.namespaces.get(ns)?.commands.get(tail).copied()
    }

    /// Resolve a command name relative to namespace `context`.
    ///
    /// Absolute names resolve from the global namespace. A simple name is
    /// looked up in `context`, then in the global namespace; a relative
    /// qualified name resolves its namespace part under `context`, then under
    /// the global namespace. Lookup never mutates any table.
    pub(crate) fn resolve_command(&self, name: &str, context: NsId) -> Option<CommandId> {
        let (ns_path, tail) = namespace::split_qualified(name);
        if tail.is_empty() {
            return None;
        }
        match ns_path {
            None => self
                .lookup_in(context, tail)
                .or_else(|| self.lookup_in(Namespaces::GLOBAL, tail)),
            Some(path) => {
                let ns = self.namespaces.find(context, path)?;
                self.lookup_in(ns, tail)
            }
        }
    }

    /// Resolve a command name from the active frame's namespace.
    pub fn find_command(&self, name: &str) -> Option<CommandId> {
        self.resolve_command(name, self.current_namespace())
    }

    pub fn command_exists(&self, name: &str) -> bool {
        self.find_command(name).is_some()
    }

    /// Look up a hidden command by its token.
    pub fn find_hidden(&self, token: &str) -> Option<CommandId> {
        self.hidden.get(token).copied()
    }

    /// Create a command. See [`Interp::create_command_with_deleter`].
    pub fn create_command(&mut self, name: &str, imp: CommandImpl) -> Option<CommandId> {
        self.create_command_with_deleter(name, imp, None)
    }

    /// Create a command, replacing any command of the same name.
    ///
    /// A qualified name creates the command in the named namespace (created
    /// if needed, relative to the active namespace); a simple name creates it
    /// in the global namespace. A replaced command is deleted first, firing
    /// its delete traces, and its imports are moved onto the new command.
    /// Returns `None` when the interpreter is deleted or the name is empty.
    pub fn create_command_with_deleter(
        &mut self,
        name: &str,
        imp: CommandImpl,
        deleter: Option<DeleteProc>,
    ) -> Option<CommandId> {
        if self.is_deleted() {
            tracing::warn!(command = name, "refusing to create command in deleted interpreter");
            return None;
        }
        let (ns, tail) = match namespace::split_qualified(name) {
            (Some(path), tail) => {
                let current = self.current_namespace();
                (self.namespaces.find_or_create(current, path)?, tail)
            }
            (None, tail) => (Namespaces::GLOBAL, tail),
        };
        if tail.is_empty() {
            return None;
        }

        let mut imports = Vec::new();
        if let Some(old) = self.lookup_in(ns, tail) {
            if let Some(record) = self.commands.get_mut(old) {
                imports = std::mem::take(&mut record.imports);
            }
            self.delete_command_by_id(old);
            if let Some(recreated) = self.lookup_in(ns, tail) {
                tracing::debug!(command = name, "discarding command recreated by its deleter");
                self.discard_record(recreated);
            }
        }

        let id = self.commands.insert(CommandRecord::new(tail, ns, imp, deleter));
        if let Some(table) = self.namespaces.get_mut(ns) {
            table.commands.insert(tail.to_string(), id);
        }
        for import in imports {
            if let Some(record) = self.commands.get_mut(import) {
                record.imp = CommandImpl::Import { real: id };
                if let Some(real) = self.commands.get_mut(id) {
                    real.imports.push(import);
                }
            }
        }
        self.namespaces.invalidate_lookups(ns);
        self.compile_epoch += 1;
        tracing::debug!(command = %self.namespaces.qualify(ns, tail), "created command");
        Some(id)
    }

    /// Remove a record from its table without traces or deleter.
    fn discard_record(&mut self, id: CommandId) {
        self.unlink(id);
        self.release_command(id);
    }

    /// Remove the table entry the record's location points at.
    ///
    /// Panics when the table does not contain the entry: the record and the
    /// tables disagree, which no sequence of public operations can produce.
    fn unlink(&mut self, id: CommandId) {
        let Some(record) = self.commands.get(id) else {
            return;
        };
        let name = record.name.clone();
        let removed = match record.location {
            Location::Namespace(ns) => match self.namespaces.get_mut(ns) {
                Some(table) => remove_entry_if(&mut table.commands, &name, id),
                None => false,
            },
            Location::Hidden => remove_entry_if(&mut self.hidden, &name, id),
            Location::Detached => return,
        };
        if !removed {
            panic!("command table corrupted: \"{}\" is missing from the table its record names", name);
        }
        if let Some(record) = self.commands.get_mut(id) {
            record.location = Location::Detached;
        }
    }

    fn insert_entry(&mut self, location: Location, name: &str, id: CommandId) {
        match location {
            Location::Namespace(ns) => {
                if let Some(table) = self.namespaces.get_mut(ns) {
                    table.commands.insert(name.to_string(), id);
                }
            }
            Location::Hidden => {
                self.hidden.insert(name.to_string(), id);
            }
            Location::Detached => {}
        }
    }

    /// Take an external reference on a record so it is not reclaimed while
    /// held. Returns false for a stale handle.
    pub fn preserve_command(&mut self, id: CommandId) -> bool {
        match self.commands.get_mut(id) {
            Some(record) => {
                record.ref_count += 1;
                true
            }
            None => false,
        }
    }

    /// Drop a reference taken with [`Interp::preserve_command`]. The record is
    /// reclaimed once it is deleted and no reference remains.
    pub fn release_command(&mut self, id: CommandId) {
        let Some(record) = self.commands.get_mut(id) else {
            return;
        };
        if record.ref_count <= 1 && record.location != Location::Detached {
            tracing::warn!(command = %record.name, "unbalanced release of a live command");
            return;
        }
        record.ref_count -= 1;
        if record.ref_count == 0 {
            self.commands.reclaim(id);
        }
    }

    /// Delete the command named `name`.
    pub fn delete_command(&mut self, name: &str) -> Result<(), EvalError> {
        let id = self
            .find_command(name)
            .ok_or_else(|| EvalError::UnknownCommand {
                action: "delete",
                name: name.to_string(),
            })?;
        self.delete_command_by_id(id);
        Ok(())
    }

    /// Delete a command through its handle.
    ///
    /// Returns false when the handle is stale or the command was already
    /// deleted. Deletion fires the delete traces exactly once; a delete
    /// requested again while the first one is running (from a trace or the
    /// deleter) only removes the table entry if it is still present.
    pub fn delete_command_by_id(&mut self, id: CommandId) -> bool {
        let Some(record) = self.commands.get_mut(id) else {
            return false;
        };
        if record.deleting {
            if record.location != Location::Detached {
                self.unlink(id);
            }
            return true;
        }
        if record.location == Location::Detached {
            return false;
        }
        record.deleting = true;
        let ns = record.ns;

        let full_name = self.command_full_name(id).unwrap_or_default();
        tracing::debug!(command = %full_name, "deleting command");
        self.fire_command_traces(id, &TraceEvent::Delete { name: &full_name });
        if let Some(record) = self.commands.get_mut(id) {
            record.traces.clear();
        }
        self.namespaces.invalidate_lookups(ns);
        self.compile_epoch += 1;

        let deleter = self.commands.get_mut(id).and_then(|r| r.deleter.take());
        if let Some(deleter) = deleter {
            deleter(self);
        }

        let Some(record) = self.commands.get_mut(id) else {
            return true;
        };
        record.epoch += 1;
        let imports = std::mem::take(&mut record.imports);
        let real = match record.imp {
            CommandImpl::Import { real } => Some(real),
            _ => None,
        };
        for import in imports {
            self.delete_command_by_id(import);
        }
        if let Some(real) = real.and_then(|r| self.commands.get_mut(r)) {
            real.imports.retain(|i| *i != id);
        }

        self.unlink(id);
        self.release_command(id);
        true
    }

    /// Deliver rename or delete traces of a record.
    ///
    /// Rename traces are suppressed while a rename trace of the same record is
    /// being delivered; delete traces always fire.
    fn fire_command_traces(&mut self, id: CommandId, event: &TraceEvent<'_>) {
        let ops = event.ops();
        let Some(record) = self.commands.get_mut(id) else {
            return;
        };
        if ops == TraceOps::RENAME && record.traces.is_active(TraceOps::RENAME) {
            return;
        }
        let Some((saved, snapshot)) = record.traces.begin(ops) else {
            return;
        };
        self.preserve_command(id);
        for entry in snapshot.iter().filter(|entry| !entry.is_removed()) {
            if let Err(e) = (entry.callback())(self, event) {
                tracing::debug!(error = %e, "ignoring error from command trace");
            }
        }
        if let Some(record) = self.commands.get_mut(id) {
            record.traces.finish(saved);
        }
        self.release_command(id);
    }

    /// Rename a command. An empty `new` name deletes it.
    ///
    /// The new name is resolved relative to the active namespace, creating
    /// namespaces as needed. Rename traces see both fully qualified names
    /// while the command is reachable under both; the old entry is removed
    /// afterwards. A rename that would make an alias resolve to itself is
    /// rolled back with [`EvalError::AliasLoop`].
    pub fn rename_command(&mut self, old: &str, new: &str) -> Result<(), EvalError> {
        if self.is_deleted() {
            return Err(EvalError::InterpreterDeleted);
        }
        let action = if new.is_empty() { "delete" } else { "rename" };
        let id = self
            .find_command(old)
            .ok_or_else(|| EvalError::UnknownCommand {
                action,
                name: old.to_string(),
            })?;
        if new.is_empty() {
            self.delete_command_by_id(id);
            return Ok(());
        }

        let Some(record) = self.commands.get(id) else {
            return Ok(());
        };
        if record.deleting {
            return Ok(());
        }
        let Location::Namespace(old_ns) = record.location else {
            return Ok(());
        };
        let old_name = record.name.clone();
        let old_full = self.namespaces.qualify(old_ns, &old_name);

        let current = self.current_namespace();
        let (new_ns, new_tail) = match namespace::split_qualified(new) {
            (Some(path), tail) => (self.namespaces.find_or_create(current, path), tail),
            (None, tail) => (Some(current), tail),
        };
        let Some(new_ns) = new_ns.filter(|_| !new_tail.is_empty()) else {
            return Err(EvalError::BadName(format!(
                "can't rename to \"{}\": bad command name",
                new
            )));
        };
        if self.lookup_in(new_ns, new_tail).is_some() {
            return Err(EvalError::DuplicateName(new.to_string()));
        }

        self.insert_entry(Location::Namespace(new_ns), new_tail, id);
        if let Some(record) = self.commands.get_mut(id) {
            record.name = new_tail.to_string();
            record.ns = new_ns;
            record.location = Location::Namespace(new_ns);
        }
        if self.would_alias_loop(id) {
            if let Some(table) = self.namespaces.get_mut(new_ns) {
                remove_entry_if(&mut table.commands, new_tail, id);
            }
            if let Some(record) = self.commands.get_mut(id) {
                record.name = old_name;
                record.ns = old_ns;
                record.location = Location::Namespace(old_ns);
            }
            return Err(EvalError::AliasLoop(new.to_string()));
        }
        self.namespaces.invalidate_lookups(old_ns);
        self.namespaces.invalidate_lookups(new_ns);

        let new_full = self.namespaces.qualify(new_ns, new_tail);
        self.preserve_command(id);
        self.fire_command_traces(
            id,
            &TraceEvent::Rename {
                old: &old_full,
                new: &new_full,
            },
        );
        if let Some(table) = self.namespaces.get_mut(old_ns) {
            remove_entry_if(&mut table.commands, &old_name, id);
        }
        if let Some(record) = self.commands.get_mut(id) {
            record.epoch += 1;
        }
        self.compile_epoch += 1;
        tracing::debug!(from = %old_full, to = %new_full, "renamed command");
        self.release_command(id);
        Ok(())
    }

    /// True when following the alias/import chain starting at `id` leads
    /// back to `id`.
    fn would_alias_loop(&self, id: CommandId) -> bool {
        let mut seen = BTreeSet::new();
        let mut current = id;
        loop {
            let Some(record) = self.commands.get(current) else {
                return false;
            };
            let next = match &record.imp {
                CommandImpl::Alias { target, .. } => {
                    self.resolve_command(target.as_str(), Namespaces::GLOBAL)
                }
                CommandImpl::Import { real } => Some(*real),
                _ => None,
            };
            match next {
                Some(next) if next == id => return true,
                Some(next) if seen.insert(next) => current = next,
                _ => return false,
            }
        }
    }

    /// Move a record to another table under a new name.
    fn move_record(&mut self, id: CommandId, dest: Location, new_name: &str) {
        self.unlink(id);
        self.insert_entry(dest, new_name, id);
        if let Some(record) = self.commands.get_mut(id) {
            record.name = new_name.to_string();
            record.location = dest;
            if let Location::Namespace(ns) = dest {
                record.ns = ns;
            }
            record.epoch += 1;
        }
        self.compile_epoch += 1;
        self.namespaces.invalidate_lookups(Namespaces::GLOBAL);
    }

    /// Move a global command into the hidden table under `token`.
    pub fn hide_command(&mut self, name: &str, token: &str) -> Result<(), EvalError> {
        if self.is_deleted() {
            return Err(EvalError::InterpreterDeleted);
        }
        if namespace::is_qualified(token) {
            return Err(EvalError::BadName(
                "cannot use namespace qualifiers in hidden command token (rename)".to_string(),
            ));
        }
        let id = self
            .find_command(name)
            .ok_or_else(|| EvalError::UnknownCommand {
                action: "hide",
                name: name.to_string(),
            })?;
        if self.commands.get(id).map(|r| r.ns) != Some(Namespaces::GLOBAL) {
            return Err(EvalError::BadName(
                "can only hide global namespace commands (use rename then hide)".to_string(),
            ));
        }
        if self.hidden.contains_key(token) {
            return Err(EvalError::DuplicateName(token.to_string()));
        }
        self.move_record(id, Location::Hidden, token);
        tracing::debug!(command = name, token, "hid command");
        Ok(())
    }

    /// Move a hidden command back into the global namespace as `name`.
    pub fn expose_command(&mut self, token: &str, name: &str) -> Result<(), EvalError> {
        if self.is_deleted() {
            return Err(EvalError::InterpreterDeleted);
        }
        if namespace::is_qualified(name) {
            return Err(EvalError::BadName(
                "can not expose to a namespace (use expose to toplevel, then rename)".to_string(),
            ));
        }
        let id = self
            .find_hidden(token)
            .ok_or_else(|| EvalError::UnknownHidden(token.to_string()))?;
        if self.commands.get(id).map(|r| r.ns) != Some(Namespaces::GLOBAL) {
            return Err(EvalError::BadName(
                "trying to expose a non-global command namespace command".to_string(),
            ));
        }
        if self.lookup_in(Namespaces::GLOBAL, name).is_some() {
            return Err(EvalError::DuplicateName(name.to_string()));
        }
        self.move_record(id, Location::Namespace(Namespaces::GLOBAL), name);
        tracing::debug!(command = name, token, "exposed command");
        Ok(())
    }

    /// Import `source` into namespace `ns` as a forwarder to the real command.
    pub fn import_command(&mut self, ns: NsId, source: &str) -> Result<CommandId, EvalError> {
        let real = self
            .find_command(source)
            .ok_or_else(|| EvalError::UnknownCommand {
                action: "import",
                name: source.to_string(),
            })?;
        let Some(record) = self.commands.get(real) else {
            return Err(EvalError::InvalidCommandName(source.to_string()));
        };
        if record.ns == ns {
            return Err(EvalError::msg(format!(
                "import pattern \"{}\" tries to import from namespace \"{}\" into itself",
                source,
                self.namespaces.full_name(ns)
            )));
        }
        let tail = record.name.clone();
        if let Some(existing) = self.lookup_in(ns, &tail) {
            match self.commands.get(existing).map(|r| &r.imp) {
                Some(CommandImpl::Import { real: r }) if *r == real => return Ok(existing),
                Some(CommandImpl::Import { .. }) => {}
                _ => {
                    return Err(EvalError::DuplicateName(self.namespaces.qualify(ns, &tail)));
                }
            }
        }
        let full = self.namespaces.qualify(ns, &tail);
        let id = self
            .create_command(&full, CommandImpl::Import { real })
            .ok_or(EvalError::InterpreterDeleted)?;
        if let Some(record) = self.commands.get_mut(real) {
            record.imports.push(id);
        }
        Ok(id)
    }

    /// Create an alias: a command that re-dispatches to `target` by name
    /// with `prefix` words prepended to its arguments.
    pub fn create_alias(&mut self, name: &str, target: &str, prefix: Vec<Value>) -> Result<CommandId, EvalError> {
        if self.is_deleted() {
            return Err(EvalError::InterpreterDeleted);
        }
        if namespace::split_qualified(name).1.is_empty() {
            return Err(EvalError::BadName(format!("can't create alias \"{}\"", name)));
        }
        let id = self
            .create_command(
                name,
                CommandImpl::Alias {
                    target: Value::from(target),
                    prefix,
                },
            )
            .ok_or(EvalError::InterpreterDeleted)?;
        if self.would_alias_loop(id) {
            self.delete_command_by_id(id);
            return Err(EvalError::AliasLoop(name.to_string()));
        }
        Ok(id)
    }

    /// Name of the command in its current table (a token when hidden).
    pub fn command_name(&self, id: CommandId) -> Option<String> {
        self.commands
            .get(id)
            .filter(|r| r.location != Location::Detached)
            .map(|r| r.name.clone())
    }

    /// Fully qualified name; the token for a hidden command.
    pub fn command_full_name(&self, id: CommandId) -> Option<String> {
        let record = self.commands.get(id)?;
        match record.location {
            Location::Namespace(ns) => Some(self.namespaces.qualify(ns, &record.name)),
            Location::Hidden => Some(record.name.clone()),
            Location::Detached => None,
        }
    }

    /// Current epoch of a record, available while the record is not
    /// reclaimed.
    pub fn command_epoch(&self, id: CommandId) -> Option<u64> {
        self.commands.get(id).map(|r| r.epoch)
    }

    /// True while the command is registered in a table.
    pub fn is_command_live(&self, id: CommandId) -> bool {
        self.commands
            .get(id)
            .is_some_and(|r| r.location != Location::Detached)
    }

    pub(crate) fn is_command_deleting(&self, id: CommandId) -> bool {
        self.commands.get(id).is_none_or(|r| r.deleting)
    }

    /// Imports of a command.
    pub fn command_imports(&self, id: CommandId) -> Vec<CommandId> {
        self.commands
            .get(id)
            .map(|r| r.imports.clone())
            .unwrap_or_default()
    }

    /// The command an import forwards to, following chains of imports.
    pub fn original_command(&self, id: CommandId) -> Option<CommandId> {
        let mut current = id;
        for _ in 0..64 {
            match &self.commands.get(current)?.imp {
                CommandImpl::Import { real } => current = *real,
                _ => return Some(current),
            }
        }
        None
    }

    /// Implementation of a command.
    pub fn command_impl(&self, id: CommandId) -> Option<CommandImpl> {
        self.commands.get(id).map(|r| r.imp.clone())
    }

    /// Names of visible commands matching a glob pattern.
    ///
    /// A qualified pattern lists the named namespace and yields fully
    /// qualified names; otherwise the active namespace and the global
    /// namespace are listed with simple names.
    pub fn list_commands(&self, pattern: Option<&str>) -> Result<Vec<String>, EvalError> {
        let current = self.current_namespace();
        let (ns_path, tail_pattern) = match pattern {
            Some(p) => namespace::split_qualified(p),
            None => (None, "*"),
        };
        let matcher = pattern::compile(tail_pattern)?;
        let mut names = BTreeSet::new();
        match ns_path {
            Some(path) => {
                if let Some(ns) = self.namespaces.find(current, path) {
                    if let Some(table) = self.namespaces.get(ns) {
                        for name in table.commands.keys().filter(|n| matcher.is_match(n)) {
                            names.insert(self.namespaces.qualify(ns, name));
                        }
                    }
                }
            }
            None => {
                for ns in [current, Namespaces::GLOBAL] {
                    if let Some(table) = self.namespaces.get(ns) {
                        names.extend(
                            table
                                .commands
                                .keys()
                                .filter(|n| matcher.is_match(n))
                                .cloned(),
                        );
                    }
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Tokens of hidden commands.
    pub fn list_hidden(&self) -> Vec<String> {
        self.hidden.keys().cloned().collect()
    }

    /// Register a trace on the command named `name`.
    pub fn trace_command(&mut self, name: &str, ops: TraceOps, callback: Box<CommandTraceFn>) -> Result<TraceId, EvalError> {
        let id = self.traced_command(name)?;
        self.trace_command_id(id, ops, callback)
    }

    /// Register a trace on a command through its handle.
    pub fn trace_command_id(&mut self, id: CommandId, ops: TraceOps, callback: Box<CommandTraceFn>) -> Result<TraceId, EvalError> {
        let record = self
            .commands
            .get_mut(id)
            .ok_or_else(|| EvalError::InvalidCommandName(format!("{:?}", id)))?;
        Ok(record.traces.add(ops, callback))
    }

    pub(crate) fn trace_command_tagged(
        &mut self,
        name: &str,
        ops: TraceOps,
        tag: &str,
        callback: Box<CommandTraceFn>,
    ) -> Result<TraceId, EvalError> {
        let id = self.traced_command(name)?;
        let record = self
            .commands
            .get_mut(id)
            .ok_or_else(|| EvalError::InvalidCommandName(name.to_string()))?;
        Ok(record.traces.add_tagged(ops, Some(tag.to_string()), callback))
    }

    pub(crate) fn untrace_command_tagged(&mut self, name: &str, ops: TraceOps, tag: &str) -> Result<bool, EvalError> {
        let id = self.traced_command(name)?;
        let Some(record) = self.commands.get_mut(id) else {
            return Ok(false);
        };
        Ok(match record.traces.find_tagged(ops, tag) {
            Some(trace) => record.traces.remove(trace),
            None => false,
        })
    }

    /// Remove a trace from the command named `name`.
    pub fn untrace_command(&mut self, name: &str, trace: TraceId) -> Result<bool, EvalError> {
        let id = self.traced_command(name)?;
        Ok(self
            .commands
            .get_mut(id)
            .is_some_and(|r| r.traces.remove(trace)))
    }

    /// Traces registered on the command named `name`, with their tags.
    pub fn command_traces(&self, name: &str) -> Result<Vec<(TraceId, TraceOps, Option<String>)>, EvalError> {
        let id = self.traced_command(name)?;
        Ok(self
            .commands
            .get(id)
            .map(|r| {
                r.traces
                    .iter()
                    .map(|e| (e.id(), e.ops(), e.tag().map(str::to_string)))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn traced_command(&self, name: &str) -> Result<CommandId, EvalError> {
        self.find_command(name)
            .ok_or_else(|| EvalError::UnknownCommand {
                action: "trace",
                name: name.to_string(),
            })
    }

    /// Create a namespace (and missing ancestors) relative to the active one.
    pub fn create_namespace(&mut self, name: &str) -> Result<NsId, EvalError> {
        if self.is_deleted() {
            return Err(EvalError::InterpreterDeleted);
        }
        let current = self.current_namespace();
        self.namespaces
            .find_or_create(current, name)
            .ok_or_else(|| EvalError::UnknownNamespace(name.to_string()))
    }

    pub fn find_namespace(&self, name: &str) -> Option<NsId> {
        self.namespaces.find(self.current_namespace(), name)
    }

    pub fn namespace_full_name(&self, ns: NsId) -> Option<String> {
        self.namespaces
            .exists(ns)
            .then(|| self.namespaces.full_name(ns))
    }

    /// Fully qualified names of the children of `ns`.
    pub fn namespace_children(&self, ns: NsId) -> Vec<String> {
        self.namespaces
            .get(ns)
            .map(|n| {
                n.children
                    .values()
                    .map(|child| self.namespaces.full_name(*child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Delete a namespace with its children, commands and variables.
    pub fn delete_namespace(&mut self, name: &str) -> Result<(), EvalError> {
        let ns = self
            .find_namespace(name)
            .ok_or_else(|| EvalError::UnknownNamespace(name.to_string()))?;
        if ns == Namespaces::GLOBAL {
            return Err(EvalError::BadName(
                "can't delete the global namespace".to_string(),
            ));
        }
        tracing::debug!(namespace = %self.namespaces.full_name(ns), "deleting namespace");
        self.namespaces.invalidate_lookups(ns);
        for id in self.namespaces.descendants_postorder(ns) {
            self.clear_namespace(id);
            self.namespaces.remove(id);
        }
        Ok(())
    }

    /// Delete every command of a namespace and drop its variables.
    fn clear_namespace(&mut self, ns: NsId) {
        loop {
            let next = self
                .namespaces
                .get(ns)
                .and_then(|n| n.commands.iter().next().map(|(k, v)| (k.clone(), *v)));
            let Some((name, id)) = next else { break };
            self.delete_command_by_id(id);
            if let Some(table) = self.namespaces.get_mut(ns) {
                remove_entry_if(&mut table.commands, &name, id);
            }
        }
        if let Some(table) = self.namespaces.get_mut(ns) {
            table.vars.clear();
        }
    }

    /// Dismantle the whole namespace tree, firing command delete traces.
    pub(crate) fn teardown_namespaces(&mut self) {
        tracing::debug!("dismantling namespace tree");
        for id in self.namespaces.descendants_postorder(Namespaces::GLOBAL) {
            self.clear_namespace(id);
            if id != Namespaces::GLOBAL {
                self.namespaces.remove(id);
            }
        }
    }
}
