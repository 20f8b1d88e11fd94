use std::time::Duration;

use clap::Subcommand;
use nook_core::{Event, SessionMode, TimerError, TimerStatus};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::context::{now_ms, print_event, AppContext};
use super::CliResult;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start the idle countdown or resume a paused one
    Start,
    /// Pause a focus session (skips an auto-started break)
    Pause,
    /// Extend the just-completed focus session
    Extend,
    /// Take a break after a completed focus session
    Break,
    /// Abandon the focus session or skip the break
    Cancel,
    /// Switch mode (focus, short, long); not allowed while running
    Switch {
        /// Target mode
        mode: SessionMode,
    },
    /// Print current timer state as JSON
    Status,
    /// Follow the running countdown, printing events as JSON lines
    Watch,
}

pub fn run(action: TimerAction) -> CliResult {
    if let TimerAction::Watch = action {
        return watch();
    }

    let mut ctx = AppContext::open()?;
    let mut events = std::mem::take(&mut ctx.caught_up);
    let outcome = apply(&mut ctx, action, &mut events);

    for event in &events {
        print_event(event)?;
    }
    ctx.save()?;

    if let Err(e) = &outcome {
        if e.is_ignorable() {
            info!(error = %e, "command ignored");
        }
    }
    outcome.map_err(Into::into)
}

fn apply(ctx: &mut AppContext, action: TimerAction, events: &mut Vec<Event>) -> Result<(), TimerError> {
    let orch = &mut ctx.orch;
    match action {
        TimerAction::Start => events.push(orch.start()?),
        TimerAction::Pause => events.push(orch.pause_session()?),
        TimerAction::Extend => events.extend(orch.extend()?),
        TimerAction::Break => events.extend(orch.take_break()?),
        TimerAction::Cancel => events.push(orch.cancel()?),
        TimerAction::Switch { mode } => events.push(orch.switch_mode(mode)?),
        TimerAction::Status => events.push(orch.snapshot()),
        TimerAction::Watch => {}
    }
    Ok(())
}

fn watch() -> CliResult {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(watch_loop())
}

/// Poll until the countdown stops running, then flush and exit.
async fn watch_loop() -> CliResult {
    let mut ctx = AppContext::open()?;
    for event in std::mem::take(&mut ctx.caught_up) {
        print_event(&event)?;
    }
    print_event(&ctx.orch.snapshot())?;

    let poll_ms = u64::from(ctx.config.ticker.poll_interval_ms.max(50));
    let mut interval = tokio::time::interval(Duration::from_millis(poll_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while is_counting_down(&ctx) {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("watch interrupted");
                break;
            }
        }

        if let Err(e) = ctx.refresh() {
            warn!(error = %e, "could not re-read stored state");
        }
        if !is_counting_down(&ctx) {
            break;
        }

        match ctx.tick() {
            Ok(events) => {
                for event in &events {
                    print_event(event)?;
                }
            }
            Err(e) => {
                warn!(error = %e, "timer degraded");
                print_event(&Event::TimerDegraded {
                    reason: e.to_string(),
                })?;
                break;
            }
        }

        let now = now_ms();
        ctx.stage(now)?;
        ctx.flush_due(now);
    }

    ctx.save()
}

fn is_counting_down(ctx: &AppContext) -> bool {
    !ctx.orch.is_awaiting_decision() && ctx.orch.state().engine.status() == TimerStatus::Running
}
