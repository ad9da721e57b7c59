//! Signal/slot connections between objects.
//!
//! A connection binds a (source, signal) pair to a (target, slot) pair.
//! Emission walks a snapshot of the connection list taken up front, so
//! slots that connect, disconnect or destroy objects during delivery never
//! disturb the walk: connections added mid-emission are not called, and a
//! removed or dead entry is skipped when its turn comes.

use crate::context::RunContext;
use crate::error::ScriptError;
use crate::variant::{Handle, Variant};

/// Identifies one connection; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnId,
    pub source: Handle,
    pub signal: String,
    pub target: Handle,
    pub slot: String,
}

impl RunContext {
    /// Connect `signal` on `source` to `slot` on `target`.  Fails (returns
    /// `false`) when either object is gone or the slot does not resolve to
    /// a function on the target.
    pub fn connect_signal(
        &mut self,
        source: Handle,
        signal: &str,
        target: Handle,
        slot: &str,
    ) -> bool {
        if signal.is_empty() || slot.is_empty() {
            return false;
        }
        if !self.objects.contains(source) || !self.objects.contains(target) {
            return false;
        }
        let slot_l = slot.to_lowercase();
        let resolvable = match self.objects.get(target) {
            Some(t) => {
                t.overrides.contains_key(&slot_l)
                    || self.classes.resolve(&t.class, &slot_l).is_some()
            }
            None => false,
        };
        if !resolvable {
            return false;
        }

        let signal_l = signal.to_lowercase();
        let id = self.objects.alloc_conn();
        self.objects.connections.insert(
            id,
            Connection {
                id,
                source,
                signal: signal_l.clone(),
                target,
                slot: slot_l,
            },
        );
        if let Some(s) = self.objects.get_mut(source) {
            s.signal_table.entry(signal_l).or_default().push(id);
        }
        if let Some(t) = self.objects.get_mut(target) {
            t.connection_list.push(id);
        }
        true
    }

    /// Remove the first connection matching all four coordinates.
    pub fn disconnect_signal(
        &mut self,
        source: Handle,
        signal: &str,
        target: Handle,
        slot: &str,
    ) -> bool {
        let signal_l = signal.to_lowercase();
        let slot_l = slot.to_lowercase();
        let id = self
            .objects
            .get(source)
            .and_then(|s| s.signal_table.get(&signal_l))
            .and_then(|ids| {
                ids.iter()
                    .find(|&&id| {
                        self.objects
                            .connections
                            .get(&id)
                            .is_some_and(|c| c.target == target && c.slot == slot_l)
                    })
                    .copied()
            });
        match id {
            Some(id) => {
                self.remove_connection(id);
                true
            }
            None => false,
        }
    }

    /// The `class::name` form used in signal diagnostics.
    fn describe_object(&self, h: Handle) -> String {
        match self.objects.get(h) {
            Some(o) => format!("{}::{}", o.class, o.name),
            None => format!("object {h}"),
        }
    }

    /// Drop a connection and unlink it from both endpoints.
    pub(crate) fn remove_connection(&mut self, id: ConnId) {
        let conn = match self.objects.connections.remove(&id) {
            Some(c) => c,
            None => return,
        };
        if let Some(s) = self.objects.get_mut(conn.source) {
            if let Some(ids) = s.signal_table.get_mut(&conn.signal) {
                ids.retain(|&i| i != id);
                if ids.is_empty() {
                    s.signal_table.remove(&conn.signal);
                }
            }
        }
        if let Some(t) = self.objects.get_mut(conn.target) {
            t.connection_list.retain(|&i| i != id);
        }
    }

    /// Deliver `signal` from `source` to every connected slot, in
    /// connection order.  Returns the number of slots actually invoked.
    ///
    /// A slot that fails does not stop delivery: the offending connection
    /// is reported and dropped, and the walk continues.
    pub fn emit_signal(
        &mut self,
        source: Handle,
        signal: &str,
        params: &[Variant],
    ) -> Result<i64, ScriptError> {
        let signal_l = signal.to_lowercase();
        let snapshot: Vec<ConnId> = self
            .objects
            .get(source)
            .and_then(|o| o.signal_table.get(&signal_l).cloned())
            .unwrap_or_default();

        let mut delivered = 0i64;
        let mut broken: Vec<ConnId> = Vec::new();
        for id in snapshot {
            // The connection or its target may have died since the
            // snapshot was taken.
            let conn = match self.objects.connections.get(&id) {
                Some(c) => c.clone(),
                None => continue,
            };
            if !self.objects.contains(conn.target) {
                continue;
            }

            let (old_sender, old_name) = match self.objects.get_mut(conn.target) {
                Some(t) => {
                    let prev = (t.signal_sender, std::mem::take(&mut t.signal_name));
                    t.signal_sender = source;
                    t.signal_name = signal_l.clone();
                    prev
                }
                None => continue,
            };

            delivered += 1;
            match self.call_object_function(conn.target, &conn.slot, None, source, params.to_vec())
            {
                Ok(_) => {
                    if let Some(t) = self.objects.get_mut(conn.target) {
                        t.signal_sender = old_sender;
                        t.signal_name = old_name;
                    }
                }
                Err(e) => {
                    if self.objects.contains(conn.target) {
                        let msg = format!(
                            "broken slot '{}' in target object '{}' while handling signal '{signal}' emitted by '{}' ({e}): disconnecting",
                            conn.slot,
                            self.describe_object(conn.target),
                            self.describe_object(source)
                        );
                        self.warning(&msg);
                        broken.push(id);
                    } else {
                        self.warning(&format!(
                            "slot object {} destroyed while handling signal '{signal}' ({e})",
                            conn.target
                        ));
                    }
                }
            }
        }
        for id in broken {
            self.remove_connection(id);
        }
        Ok(delivered)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_logger() -> (RunContext, crate::window::MemoryWindow) {
        let (mut ctx, win) = RunContext::collecting();
        ctx.run(
            "class (logger) { log { echo logged $0 } boom { %none->$oops() } }",
        )
        .expect("class setup failed");
        (ctx, win)
    }

    #[test]
    fn emit_reaches_connected_slots_in_order() {
        let (mut ctx, win) = ctx_with_logger();
        let src = ctx.create_object("object", Handle::NULL, "src", vec![]).unwrap();
        let a = ctx.create_object("logger", Handle::NULL, "a", vec![]).unwrap();
        let b = ctx.create_object("logger", Handle::NULL, "b", vec![]).unwrap();
        assert!(ctx.connect_signal(src, "fired", a, "log"));
        assert!(ctx.connect_signal(src, "fired", b, "log"));

        let n = ctx.emit_signal(src, "fired", &["x".into()]).unwrap();
        assert_eq!(n, 2);
        assert_eq!(win.lines(), vec!["logged x".to_string(), "logged x".to_string()]);
    }

    #[test]
    fn connect_requires_a_resolvable_slot() {
        let (mut ctx, _) = ctx_with_logger();
        let src = ctx.create_object("object", Handle::NULL, "", vec![]).unwrap();
        let tgt = ctx.create_object("logger", Handle::NULL, "", vec![]).unwrap();
        assert!(!ctx.connect_signal(src, "fired", tgt, "absent"));
        assert!(!ctx.connect_signal(src, "", tgt, "log"));
    }

    #[test]
    fn destroying_the_target_silences_the_connection() {
        let (mut ctx, _) = ctx_with_logger();
        let src = ctx.create_object("object", Handle::NULL, "", vec![]).unwrap();
        let tgt = ctx.create_object("logger", Handle::NULL, "", vec![]).unwrap();
        assert!(ctx.connect_signal(src, "fired", tgt, "log"));
        ctx.destroy_object(tgt);
        let n = ctx.emit_signal(src, "fired", &[]).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn broken_slot_is_disconnected_but_delivery_continues() {
        let (mut ctx, win) = ctx_with_logger();
        let src = ctx.create_object("object", Handle::NULL, "", vec![]).unwrap();
        let bad = ctx.create_object("logger", Handle::NULL, "bad", vec![]).unwrap();
        let good = ctx.create_object("logger", Handle::NULL, "good", vec![]).unwrap();
        // 'boom' calls a function on a non-object and fails.
        assert!(ctx.connect_signal(src, "fired", bad, "boom"));
        assert!(ctx.connect_signal(src, "fired", good, "log"));

        let n = ctx.emit_signal(src, "fired", &["p".into()]).unwrap();
        assert_eq!(n, 2); // both slots were invoked
        assert_eq!(win.lines(), vec!["logged p".to_string()]);
        // The diagnostic names both endpoints as class::name.
        assert!(win
            .warnings()
            .iter()
            .any(|w| w.contains("broken slot") && w.contains("'logger::bad'")));

        // The broken connection is gone; a second emission reaches only
        // the good slot.
        let n = ctx.emit_signal(src, "fired", &["q".into()]).unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn disconnect_removes_one_connection() {
        let (mut ctx, _) = ctx_with_logger();
        let src = ctx.create_object("object", Handle::NULL, "", vec![]).unwrap();
        let tgt = ctx.create_object("logger", Handle::NULL, "", vec![]).unwrap();
        assert!(ctx.connect_signal(src, "fired", tgt, "log"));
        assert!(ctx.disconnect_signal(src, "fired", tgt, "log"));
        assert!(!ctx.disconnect_signal(src, "fired", tgt, "log"));
        assert_eq!(ctx.emit_signal(src, "fired", &[]).unwrap(), 0);
    }

    #[test]
    fn sender_and_signal_name_visible_during_delivery() {
        let (mut ctx, win) = RunContext::collecting();
        ctx.run("class (watcher) { spy { echo $( @$signalName() ) } }")
            .unwrap();
        let src = ctx.create_object("object", Handle::NULL, "", vec![]).unwrap();
        let tgt = ctx.create_object("watcher", Handle::NULL, "", vec![]).unwrap();
        assert!(ctx.connect_signal(src, "Ping", tgt, "spy"));
        ctx.emit_signal(src, "Ping", &[]).unwrap();
        assert_eq!(win.lines(), vec!["ping".to_string()]);
    }
}
