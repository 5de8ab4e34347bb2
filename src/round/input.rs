//! Per-phase input handling.
//!
//! The controller binds one [`PhaseInputHandler`] per phase, obtained from an
//! [`InputHandlerFactory`]. Clicks that land on a UI overlay or on a unit
//! that is not interactable are dropped by the controller before a handler
//! ever sees them.

use crate::roster::{PlayerNumber, UnitId, UnitInfo};

use super::state::Phase;

/// Pointer input on a unit, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickEvent {
    /// The unit under the pointer
    pub unit: UnitId,
    /// Whether the pointer was over a UI overlay element
    pub over_ui: bool,
}

impl ClickEvent {
    /// A click that reached the unit.
    #[must_use]
    pub const fn on(unit: UnitId) -> Self {
        Self {
            unit,
            over_ui: false,
        }
    }

    /// A click that hit an overlay above the unit.
    #[must_use]
    pub const fn through_ui(unit: UnitId) -> Self {
        Self {
            unit,
            over_ui: true,
        }
    }
}

/// Match context available to input handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputContext {
    /// Current phase
    pub phase: Phase,
    /// Player in control
    pub current_player: PlayerNumber,
    /// Current round number
    pub round: u32,
    /// Unit currently selected, if any
    pub selected: Option<UnitId>,
}

/// What a handler wants the controller to do with a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    /// Nothing
    Ignore,
    /// Make this the selected unit
    Select(UnitId),
    /// Clear the selection
    Deselect,
    /// The unit is done acting
    FinishUnit(UnitId),
}

/// Input strategy bound to a phase.
pub trait PhaseInputHandler: Send {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// The handler became active for `phase`.
    fn on_enter(&mut self, _phase: Phase) {}

    /// The handler is being replaced.
    fn on_exit(&mut self) {}

    /// A unit was clicked.
    fn on_unit_clicked(&mut self, unit: &UnitInfo<'_>, ctx: &InputContext) -> InputAction;
}

/// Supplies the handler for each phase.
pub trait InputHandlerFactory: Send {
    /// Handler to bind when `phase` is entered.
    fn handler_for(&self, phase: Phase) -> Box<dyn PhaseInputHandler>;
}

/// Ignores every click.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockedInput;

impl PhaseInputHandler for BlockedInput {
    fn name(&self) -> &'static str {
        "blocked"
    }

    fn on_unit_clicked(&mut self, _unit: &UnitInfo<'_>, _ctx: &InputContext) -> InputAction {
        InputAction::Ignore
    }
}

/// Turn input: click an idle unit of the player in control to select it,
/// click the selected unit again to finish it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectionInput;

impl PhaseInputHandler for SelectionInput {
    fn name(&self) -> &'static str {
        "selection"
    }

    fn on_unit_clicked(&mut self, unit: &UnitInfo<'_>, ctx: &InputContext) -> InputAction {
        if unit.owner != ctx.current_player || unit.ended {
            return InputAction::Ignore;
        }
        if ctx.selected == Some(unit.id) {
            InputAction::FinishUnit(unit.id)
        } else {
            InputAction::Select(unit.id)
        }
    }
}

/// [`SelectionInput`] while a turn is active, [`BlockedInput`] otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultInputHandlers;

impl InputHandlerFactory for DefaultInputHandlers {
    fn handler_for(&self, phase: Phase) -> Box<dyn PhaseInputHandler> {
        match phase {
            Phase::TurnActive => Box::new(SelectionInput),
            _ => Box::new(BlockedInput),
        }
    }
}
