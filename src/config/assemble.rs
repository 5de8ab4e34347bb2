//! Turns a validated [`MatchConfig`] into a [`RoundControllerBuilder`].

use tracing::debug;

use crate::config::schema::{Control, MatchConfig};
use crate::roster::{AutoPlayer, ManualPlayer, ScriptedFate, UnitSpec};
use crate::round::{
    DelayedActionScheduler, LastPlayerStanding, MatchHandle, RoundController,
    RoundControllerBuilder, Scene, ScriptedNarrative,
};

/// Builds the collaborators described by `config`.
///
/// Auto players and scripted casualties act through `handle`; delayed
/// actions go through `scheduler`. The caller adds listeners and builds.
#[must_use]
pub fn assemble(
    config: &MatchConfig,
    handle: &MatchHandle,
    scheduler: DelayedActionScheduler,
) -> RoundControllerBuilder {
    let victory = LastPlayerStanding::new(config.victory.protagonist)
        .concede_on_elimination(config.victory.concede_on_elimination);

    let scenes = config
        .narrative
        .iter()
        .map(|scene| Scene {
            round: scene.round,
            player: scene.player,
            lines: scene.lines.clone(),
            duration: scene.duration,
        })
        .collect();

    let mut builder = RoundController::builder(scheduler)
        .timing(config.timing.into())
        .victory(victory)
        .narrative(ScriptedNarrative::new(scenes))
        .after_game(config.after_game);

    for player in &config.players {
        debug!(player = %player.number, name = %player.name, control = player.control.as_str(), "player");
        builder = match player.control {
            Control::Auto => {
                builder.player(AutoPlayer::new(player.number, &player.name, handle.clone()))
            }
            Control::Manual => builder.player(ManualPlayer::new(player.number, &player.name)),
        };
    }

    for unit in &config.units {
        let spec = UnitSpec::new(&unit.name, unit.owner);
        builder = builder.unit(match unit.falls_in_round {
            Some(round) => spec.with_hooks(ScriptedFate::new(round, handle.clone())),
            None => spec,
        });
    }

    builder
}
