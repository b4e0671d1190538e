use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;

use super::{Job, RuntimeError, Scheduler};
use crate::{
    service::{event::BotEvent, state::AutoDirection, user::AutoInsideMode, ServiceRegistry},
    state::AppState,
    transport::{ChatTransport, SendOptions},
};

const OUTAGE_FLAG: &str = "embassy_outage_announced";

/// What every job needs to reach services and the main chat.
#[derive(Clone)]
pub struct JobContext {
    pub services: ServiceRegistry,
    pub transport: Arc<dyn ChatTransport>,
    pub main_chat_id: Option<i64>,
    pub language: String,
}

impl JobContext {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            services: state.services.clone(),
            transport: Arc::clone(&state.transport),
            main_chat_id: state.config.router.main_chat_id,
            language: state.config.router.default_language.clone(),
        }
    }

    async fn announce(&self, text: &str) {
        let Some(chat_id) = self.main_chat_id else {
            return;
        };
        if let Err(e) = self.transport.send_text(chat_id, text, SendOptions::default()).await {
            warn!("Failed to announce to chat {}: {}", chat_id, e);
        }
    }
}

/// Applies device-based presence in one direction. Returns how many users changed.
///
/// An unreachable embassy is announced once in the main chat and announced again when it recovers.
pub async fn run_auto_presence(ctx: &JobContext, direction: AutoDirection) -> Result<usize, RuntimeError> {
    let users: Vec<_> = ctx
        .services
        .users
        .users()
        .await?
        .into_iter()
        .filter(|user| user.autoinside != AutoInsideMode::Disabled && !user.mac.is_empty())
        .collect();
    if users.is_empty() {
        return Ok(0);
    }

    let devices = match ctx.services.platform.embassy.devices_inside().await {
        Ok(devices) => devices,
        Err(e) => {
            warn!("Embassy devices are unavailable: {}", e);
            if !ctx.services.bot_state.flag(OUTAGE_FLAG).await {
                ctx.announce(&t!("runtime.embassy_outage", locale = &ctx.language)).await;
                ctx.services.bot_state.set_flag(OUTAGE_FLAG, true).await?;
            }
            return Ok(0);
        }
    };

    if ctx.services.bot_state.flag(OUTAGE_FLAG).await {
        ctx.announce(&t!("runtime.embassy_restored", locale = &ctx.language)).await;
        ctx.services.bot_state.set_flag(OUTAGE_FLAG, false).await?;
    }

    let changed = ctx.services.state.auto_presence(direction, &devices, &users).await?;
    if changed > 0 {
        info!("Auto presence {:?} changed {} users", direction, changed);
    }

    Ok(changed)
}

pub async fn run_timed_out_sweep(ctx: &JobContext) -> Result<usize, RuntimeError> {
    Ok(ctx.services.state.sweep_timed_out(Utc::now()).await?)
}

/// Nudges camera live handlers to post a fresh snapshot.
pub fn rebroadcast(ctx: &JobContext) {
    ctx.services.events.emit(BotEvent::CamLiveUpdate);
}

pub struct AutoPresenceJob {
    ctx: JobContext,
    direction: AutoDirection,
    interval: Duration,
}

#[async_trait]
impl Job for AutoPresenceJob {
    fn name(&self) -> &str {
        match self.direction {
            AutoDirection::In => "auto-in",
            AutoDirection::Out => "auto-out",
        }
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<(), RuntimeError> {
        run_auto_presence(&self.ctx, self.direction).await?;
        Ok(())
    }
}

pub struct TimedOutJob {
    ctx: JobContext,
    interval: Duration,
}

#[async_trait]
impl Job for TimedOutJob {
    fn name(&self) -> &str {
        "timed-out"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<(), RuntimeError> {
        run_timed_out_sweep(&self.ctx).await?;
        Ok(())
    }
}

pub struct CamLiveJob {
    ctx: JobContext,
    interval: Duration,
}

#[async_trait]
impl Job for CamLiveJob {
    fn name(&self) -> &str {
        "cam-live"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<(), RuntimeError> {
        rebroadcast(&self.ctx);
        Ok(())
    }
}

pub struct PersistJob {
    ctx: JobContext,
    interval: Duration,
}

#[async_trait]
impl Job for PersistJob {
    fn name(&self) -> &str {
        "persist"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<(), RuntimeError> {
        self.ctx.services.bot_state.persist().await?;
        Ok(())
    }
}

impl Scheduler {
    /// Registers every recurring job of the bot. Zero intervals disable a job.
    pub fn for_state(state: &AppState) -> Self {
        let ctx = JobContext::from_state(state);
        let intervals = &state.config.background_tasks;
        let embassy_enabled = !state
            .config
            .router
            .disabled_features
            .iter()
            .any(|feature| feature == "embassy");

        let mut scheduler = Scheduler::new();

        if embassy_enabled {
            for (direction, secs) in [
                (AutoDirection::In, intervals.auto_in_interval_secs),
                (AutoDirection::Out, intervals.auto_out_interval_secs),
            ] {
                if secs > 0 {
                    scheduler.add_job(AutoPresenceJob {
                        ctx: ctx.clone(),
                        direction,
                        interval: Duration::from_secs(secs),
                    });
                }
            }
            if intervals.cam_live_interval_secs > 0 {
                scheduler.add_job(CamLiveJob {
                    ctx: ctx.clone(),
                    interval: Duration::from_secs(intervals.cam_live_interval_secs),
                });
            }
        }

        if intervals.timed_out_interval_secs > 0 {
            scheduler.add_job(TimedOutJob {
                ctx: ctx.clone(),
                interval: Duration::from_secs(intervals.timed_out_interval_secs),
            });
        }
        if intervals.persist_interval_secs > 0 {
            scheduler.add_job(PersistJob {
                ctx,
                interval: Duration::from_secs(intervals.persist_interval_secs),
            });
        }

        scheduler
    }
}
