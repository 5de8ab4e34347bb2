//! Unit roster and player identities.
//!
//! The [`UnitRegistry`] is the live roster the round controller reads from.
//! A player is "alive" while at least one unit references its number; that
//! status is always derived from the roster and never stored.
//!
//! The per-turn `ended` flag and the `interactable` flag can only be changed
//! from inside the crate. Everything outside sees them through getters and
//! through the [`UnitHooks`] notifications.

pub mod fate;
pub mod player;

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::observability::events::panic_message;

pub use fate::ScriptedFate;
pub use player::{AutoPlayer, ManualPlayer, Player, TurnView};

/// Player identity, assigned by configuration before the match starts.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerNumber(pub u32);

impl std::fmt::Display for PlayerNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Roster-assigned unit identity. Never reused within one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u32);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Error type collaborator hooks may return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Read-only view of a unit handed to hooks and input handlers.
#[derive(Debug, Clone, Copy)]
pub struct UnitInfo<'a> {
    /// Unit identity
    pub id: UnitId,
    /// Display name
    pub name: &'a str,
    /// Owning player
    pub owner: PlayerNumber,
    /// Whether the unit has finished acting this round
    pub ended: bool,
}

/// Match context passed alongside every unit hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookContext {
    /// Current round number
    pub round: u32,
    /// Player in control
    pub current_player: PlayerNumber,
}

/// Phase boundary a unit is being notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitHook {
    /// A new round has begun
    RoundStart,
    /// A turn is starting
    TurnStart,
    /// A turn has ended
    TurnEnd,
    /// The round is over
    RoundEnd,
}

impl UnitHook {
    /// Stable name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RoundStart => "round_start",
            Self::TurnStart => "turn_start",
            Self::TurnEnd => "turn_end",
            Self::RoundEnd => "round_end",
        }
    }
}

/// Per-unit notifications at phase boundaries.
///
/// Every method defaults to a no-op. Errors and panics are caught by the
/// roster, logged, and never abort the transition in progress.
pub trait UnitHooks: Send {
    /// Called on every live unit when a round starts.
    ///
    /// # Errors
    ///
    /// Any error is logged and isolated.
    fn on_round_start(&mut self, _unit: &UnitInfo<'_>, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Called on every live unit when a turn starts.
    ///
    /// # Errors
    ///
    /// Any error is logged and isolated.
    fn on_turn_start(&mut self, _unit: &UnitInfo<'_>, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Called on every live unit when a turn ends.
    ///
    /// # Errors
    ///
    /// Any error is logged and isolated.
    fn on_turn_end(&mut self, _unit: &UnitInfo<'_>, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Called on every live unit when a round ends.
    ///
    /// # Errors
    ///
    /// Any error is logged and isolated.
    fn on_round_end(&mut self, _unit: &UnitInfo<'_>, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }
}

/// Hooks that ignore every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl UnitHooks for NoHooks {}

/// Description of a unit to be added to the roster.
pub struct UnitSpec {
    /// Display name
    pub name: String,
    /// Owning player
    pub owner: PlayerNumber,
    /// Notification hooks
    pub hooks: Box<dyn UnitHooks>,
}

impl UnitSpec {
    /// Creates a spec with no-op hooks.
    #[must_use]
    pub fn new(name: impl Into<String>, owner: PlayerNumber) -> Self {
        Self {
            name: name.into(),
            owner,
            hooks: Box::new(NoHooks),
        }
    }

    /// Replaces the unit's hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: impl UnitHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }
}

impl std::fmt::Debug for UnitSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitSpec")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// A unit in the live roster.
pub struct Unit {
    id: UnitId,
    name: String,
    owner: PlayerNumber,
    ended: bool,
    interactable: bool,
    hooks: Box<dyn UnitHooks>,
}

impl Unit {
    /// Unit identity.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning player.
    #[must_use]
    pub const fn owner(&self) -> PlayerNumber {
        self.owner
    }

    /// Whether the unit has finished acting this round.
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    /// Whether the unit currently accepts input.
    #[must_use]
    pub const fn is_interactable(&self) -> bool {
        self.interactable
    }

    /// Read-only view for collaborators.
    #[must_use]
    pub fn info(&self) -> UnitInfo<'_> {
        UnitInfo {
            id: self.id,
            name: &self.name,
            owner: self.owner,
            ended: self.ended,
        }
    }
}

impl std::fmt::Debug for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("ended", &self.ended)
            .field("interactable", &self.interactable)
            .finish_non_exhaustive()
    }
}

/// Live roster of units, in insertion order.
#[derive(Debug, Default)]
pub struct UnitRegistry {
    units: Vec<Unit>,
    next_id: u32,
}

impl UnitRegistry {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit and returns its new identity.
    ///
    /// New units start not ended and not interactable; the controller
    /// decides when they may receive input.
    pub fn insert(&mut self, spec: UnitSpec) -> UnitId {
        let id = UnitId(self.next_id);
        self.next_id += 1;
        self.units.push(Unit {
            id,
            name: spec.name,
            owner: spec.owner,
            ended: false,
            interactable: false,
            hooks: spec.hooks,
        });
        id
    }

    /// Removes a unit from the roster.
    pub fn remove(&mut self, id: UnitId) -> Option<Unit> {
        let index = self.units.iter().position(|u| u.id == id)?;
        Some(self.units.remove(index))
    }

    /// Looks up a unit.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == id)
    }

    /// Iterates live units in roster order.
    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    /// Number of live units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Distinct owners that still have at least one unit.
    #[must_use]
    pub fn owners(&self) -> BTreeSet<PlayerNumber> {
        self.units.iter().map(|u| u.owner).collect()
    }

    /// Whether `player` still owns any unit.
    #[must_use]
    pub fn owns_any(&self, player: PlayerNumber) -> bool {
        self.units.iter().any(|u| u.owner == player)
    }

    /// Whether `player` owns a unit that has not acted yet.
    #[must_use]
    pub fn has_pending(&self, player: PlayerNumber) -> bool {
        self.units.iter().any(|u| u.owner == player && !u.ended)
    }

    /// Whether any unit at all has not acted yet.
    #[must_use]
    pub fn any_pending(&self) -> bool {
        self.units.iter().any(|u| !u.ended)
    }

    /// Units of `player` that have not acted yet, in roster order.
    #[must_use]
    pub fn pending_for(&self, player: PlayerNumber) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|u| u.owner == player && !u.ended)
            .map(|u| u.id)
            .collect()
    }

    /// `(unit, ended)` pairs in roster order.
    #[must_use]
    pub fn ended_flags(&self) -> Vec<(UnitId, bool)> {
        self.units.iter().map(|u| (u.id, u.ended)).collect()
    }

    pub(crate) fn set_ended(&mut self, id: UnitId, ended: bool) -> bool {
        match self.units.iter_mut().find(|u| u.id == id) {
            Some(unit) => {
                unit.ended = ended;
                true
            }
            None => false,
        }
    }

    /// Marks every unit of `player` ended; returns how many changed.
    pub(crate) fn end_all_for(&mut self, player: PlayerNumber) -> usize {
        let mut changed = 0;
        for unit in self.units.iter_mut().filter(|u| u.owner == player && !u.ended) {
            unit.ended = true;
            changed += 1;
        }
        changed
    }

    pub(crate) fn reset_ended(&mut self) {
        for unit in &mut self.units {
            unit.ended = false;
        }
    }

    pub(crate) fn set_all_interactable(&mut self, interactable: bool) {
        for unit in &mut self.units {
            unit.interactable = interactable;
        }
    }

    pub(crate) fn set_interactable(&mut self, id: UnitId, interactable: bool) {
        if let Some(unit) = self.units.iter_mut().find(|u| u.id == id) {
            unit.interactable = interactable;
        }
    }

    /// Applies saved `ended` flags; unknown ids are ignored.
    pub(crate) fn restore_ended(&mut self, flags: &[(UnitId, bool)]) {
        for &(id, ended) in flags {
            self.set_ended(id, ended);
        }
    }

    /// Invokes `hook` on every live unit in roster order.
    ///
    /// Returns the number of hooks that failed or panicked.
    pub(crate) fn notify(&mut self, hook: UnitHook, ctx: &HookContext) -> usize {
        let mut failures = 0;
        for unit in &mut self.units {
            let info = UnitInfo {
                id: unit.id,
                name: &unit.name,
                owner: unit.owner,
                ended: unit.ended,
            };
            let hooks = &mut unit.hooks;
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| match hook {
                UnitHook::RoundStart => hooks.on_round_start(&info, ctx),
                UnitHook::TurnStart => hooks.on_turn_start(&info, ctx),
                UnitHook::TurnEnd => hooks.on_turn_end(&info, ctx),
                UnitHook::RoundEnd => hooks.on_round_end(&info, ctx),
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(unit = %info.id, hook = hook.as_str(), error = %e, "unit hook failed");
                }
                Err(payload) => {
                    failures += 1;
                    warn!(
                        unit = %info.id,
                        hook = hook.as_str(),
                        panic = %panic_message(payload.as_ref()),
                        "unit hook panicked"
                    );
                }
            }
        }
        failures
    }
}
