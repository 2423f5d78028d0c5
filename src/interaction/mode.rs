//! Interaction mode state machine: hold-to-confirm switching between
//! sign, spelling, and navigate modes, with post-switch cooldown.
//!
//! Candidates come from two independent sources: the two-hand pose
//! detector (timed hold + cooldown) and the sequence classifier's
//! mode labels (immediate, gated by `ClassifierSwitchPolicy`).

use tracing::{debug, info};

use super::timer::TimerSlot;

// ── Mode ───────────────────────────────────────────────────

/// The active interaction mode. Exactly one is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InteractionMode {
    /// Whole-sign recognition with confirmation and speech.
    #[default]
    Sign,
    /// Fingerspelling into the word builder.
    Spelling,
    /// Touchless pointer navigation.
    Navigate,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sign => "sign",
            Self::Spelling => "spelling",
            Self::Navigate => "navigate",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sign" => Some(Self::Sign),
            "spelling" => Some(Self::Spelling),
            "navigate" => Some(Self::Navigate),
            _ => None,
        }
    }
}

/// What caused a mode switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchSource {
    /// Two-hand pose held for the hold duration.
    Pose,
    /// Mode label from the sequence classifier.
    Classifier,
    /// Explicit operator selection.
    Manual,
}

impl SwitchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pose => "pose",
            Self::Classifier => "classifier",
            Self::Manual => "manual",
        }
    }
}

/// Whether classifier-triggered switches honor the post-switch cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierSwitchPolicy {
    /// Switch as soon as the label arrives.
    Immediate,
    /// Drop the label while a cooldown is running.
    RespectCooldown,
}

impl ClassifierSwitchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::RespectCooldown => "respect-cooldown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "immediate" => Some(Self::Immediate),
            "respect-cooldown" => Some(Self::RespectCooldown),
            _ => None,
        }
    }
}

// ── Hold ───────────────────────────────────────────────────

/// A candidate switch being held. Target always differs from the
/// current mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeHold {
    pub target: InteractionMode,
    pub started_ms: f64,
    /// 0.0-1.0; reaching 1.0 commits.
    pub progress: f32,
}

// ── Events ─────────────────────────────────────────────────

/// Events emitted by the mode state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeEvent {
    /// A new candidate began to be held.
    HoldStarted { target: InteractionMode },
    /// The held candidate advanced.
    HoldProgress {
        target: InteractionMode,
        progress: f32,
    },
    /// The candidate changed or disappeared before committing.
    HoldCancelled { target: InteractionMode },
    /// The active mode changed.
    Switched {
        from: InteractionMode,
        to: InteractionMode,
        source: SwitchSource,
    },
}

// ── Config ─────────────────────────────────────────────────

/// Timing for mode switching.
#[derive(Debug, Clone)]
pub struct ModeConfig {
    /// Continuous hold required to commit (ms).
    pub hold_ms: f64,
    /// Post-switch period during which no hold may start (ms).
    pub cooldown_ms: f64,
    /// Cooldown handling for classifier mode labels.
    pub classifier_policy: ClassifierSwitchPolicy,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            hold_ms: 1000.0,
            cooldown_ms: 1500.0,
            classifier_policy: ClassifierSwitchPolicy::Immediate,
        }
    }
}

// ── State machine ──────────────────────────────────────────

/// Owner of the active interaction mode.
pub struct ModeStateMachine {
    /// Configuration.
    pub config: ModeConfig,
    mode: InteractionMode,
    hold: Option<ModeHold>,
    cooldown: TimerSlot,
    /// Committed switches this session.
    pub switches: u64,
    /// Classifier labels dropped by the cooldown policy.
    pub cooldown_blocks: u64,
}

impl ModeStateMachine {
    pub fn new(config: ModeConfig) -> Self {
        Self {
            config,
            mode: InteractionMode::Sign,
            hold: None,
            cooldown: TimerSlot::new("mode-cooldown"),
            switches: 0,
            cooldown_blocks: 0,
        }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// Takes effect on the next update; a running hold is measured
    /// against the new duration.
    pub fn set_hold_ms(&mut self, ms: f64) {
        self.config.hold_ms = ms.max(0.0);
    }

    pub fn set_cooldown_ms(&mut self, ms: f64) {
        self.config.cooldown_ms = ms.max(0.0);
    }

    pub fn set_classifier_policy(&mut self, policy: ClassifierSwitchPolicy) {
        self.config.classifier_policy = policy;
    }

    pub fn hold(&self) -> Option<&ModeHold> {
        self.hold.as_ref()
    }

    pub fn in_cooldown(&self, now_ms: f64) -> bool {
        self.cooldown
            .remaining_ms(now_ms)
            .map(|ms| ms > 0.0)
            .unwrap_or(false)
    }

    /// Per-frame update with the pose detector's candidate (if any).
    pub fn update(
        &mut self,
        candidate: Option<InteractionMode>,
        now_ms: f64,
    ) -> Option<ModeEvent> {
        self.cooldown.poll(now_ms);
        let candidate = candidate.filter(|c| *c != self.mode);

        if self.cooldown.is_armed() {
            return self
                .hold
                .take()
                .map(|h| ModeEvent::HoldCancelled { target: h.target });
        }

        match (self.hold, candidate) {
            (None, None) => None,
            (Some(h), None) => {
                self.hold = None;
                debug!("Mode hold for {} released", h.target.as_str());
                Some(ModeEvent::HoldCancelled { target: h.target })
            }
            (Some(h), Some(target)) if h.target == target => {
                let elapsed = now_ms - h.started_ms;
                let progress = if self.config.hold_ms <= 0.0 {
                    1.0
                } else {
                    (elapsed / self.config.hold_ms).clamp(0.0, 1.0) as f32
                };
                if progress >= 1.0 {
                    Some(self.commit(target, SwitchSource::Pose, now_ms))
                } else {
                    self.hold = Some(ModeHold { progress, ..h });
                    Some(ModeEvent::HoldProgress { target, progress })
                }
            }
            (_, Some(target)) => {
                self.hold = Some(ModeHold {
                    target,
                    started_ms: now_ms,
                    progress: 0.0,
                });
                debug!("Mode hold started for {}", target.as_str());
                Some(ModeEvent::HoldStarted { target })
            }
        }
    }

    /// Mode label from the sequence classifier. A running hold is
    /// cancelled by the switch.
    pub fn request_from_classifier(
        &mut self,
        target: InteractionMode,
        now_ms: f64,
    ) -> Vec<ModeEvent> {
        self.cooldown.poll(now_ms);
        if target == self.mode {
            return Vec::new();
        }
        if self.config.classifier_policy == ClassifierSwitchPolicy::RespectCooldown
            && self.cooldown.is_armed()
        {
            self.cooldown_blocks += 1;
            debug!(
                "Classifier switch to {} blocked by cooldown",
                target.as_str()
            );
            return Vec::new();
        }
        let mut events: Vec<ModeEvent> = self.cancel_hold().into_iter().collect();
        events.push(self.commit(target, SwitchSource::Classifier, now_ms));
        events
    }

    /// Explicit operator selection. Bypasses hold and cooldown and resets
    /// both.
    pub fn set_mode(&mut self, target: InteractionMode) -> Vec<ModeEvent> {
        let mut events: Vec<ModeEvent> = self.cancel_hold().into_iter().collect();
        self.cooldown.cancel();
        if target == self.mode {
            return events;
        }
        let from = self.mode;
        self.mode = target;
        self.switches += 1;
        info!("Mode set to {} (manual)", target.as_str());
        events.push(ModeEvent::Switched {
            from,
            to: target,
            source: SwitchSource::Manual,
        });
        events
    }

    fn cancel_hold(&mut self) -> Option<ModeEvent> {
        let h = self.hold.take()?;
        debug!("Mode hold for {} cancelled", h.target.as_str());
        Some(ModeEvent::HoldCancelled { target: h.target })
    }

    fn commit(&mut self, target: InteractionMode, source: SwitchSource, now_ms: f64) -> ModeEvent {
        let from = self.mode;
        self.mode = target;
        self.hold = None;
        self.cooldown.arm(now_ms, self.config.cooldown_ms);
        self.switches += 1;
        info!(
            "Mode switched {} -> {} ({})",
            from.as_str(),
            target.as_str(),
            source.as_str()
        );
        ModeEvent::Switched {
            from,
            to: target,
            source,
        }
    }

    /// Drop any hold and cooldown (shutdown / reinitialization).
    pub fn reset(&mut self) -> Option<ModeEvent> {
        self.cooldown.cancel();
        self.cancel_hold()
    }

    /// Generate s-expression for status output.
    pub fn status_sexp(&self, now_ms: f64) -> String {
        let hold = self
            .hold
            .map(|h| format!("(:target :{} :progress {:.2})", h.target.as_str(), h.progress))
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:mode :{} :hold {} :cooldown-ms {:.0} :policy :{} :switches {})",
            self.mode.as_str(),
            hold,
            self.cooldown.remaining_ms(now_ms).unwrap_or(0.0),
            self.config.classifier_policy.as_str(),
            self.switches,
        )
    }
}

impl Default for ModeStateMachine {
    fn default() -> Self {
        Self::new(ModeConfig::default())
    }
}

// ── Tests ──────────────────────────────────────────────────
