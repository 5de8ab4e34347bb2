//! Scripted casualties for headless matches.

use tracing::debug;

use crate::round::command::MatchHandle;

use super::{HookContext, HookError, UnitHooks, UnitInfo};

/// Reports its unit destroyed when a given round starts.
///
/// Stands in for combat resolution, which lives outside this crate.
#[derive(Debug, Clone)]
pub struct ScriptedFate {
    falls_in_round: u32,
    handle: MatchHandle,
}

impl ScriptedFate {
    /// The unit falls at the start of round `falls_in_round`.
    #[must_use]
    pub const fn new(falls_in_round: u32, handle: MatchHandle) -> Self {
        Self {
            falls_in_round,
            handle,
        }
    }
}

impl UnitHooks for ScriptedFate {
    fn on_round_start(&mut self, unit: &UnitInfo<'_>, ctx: &HookContext) -> Result<(), HookError> {
        if ctx.round != self.falls_in_round {
            return Ok(());
        }
        debug!(unit = %unit.id, name = unit.name, round = ctx.round, "scripted casualty");
        if self.handle.destroy_unit(unit.id) {
            Ok(())
        } else {
            Err("match timeline closed".into())
        }
    }
}
