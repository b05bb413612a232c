use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{Probe, ProbeSet};
use crate::monitoring::config::ProbeConfig;
use crate::monitoring::types::ProbeOutcome;

/// Fake probe replaying scripted outcomes, then repeating a fallback
pub struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeOutcome>>,
    fallback: ProbeOutcome,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn always(outcome: ProbeOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: outcome,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn sequence(outcomes: impl IntoIterator<Item = ProbeOutcome>, then: ProbeOutcome) -> Self {
        let probe = Self::always(then);
        probe.script.lock().unwrap().extend(outcomes);
        probe
    }

    /// Sleep this long before answering
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, _host: &str, _config: &ProbeConfig) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        outcome
    }
}

/// Probe set where every protocol answers with `probe`
pub fn uniform(probe: Arc<ScriptedProbe>) -> ProbeSet {
    ProbeSet::with_probes(probe.clone(), probe.clone(), probe.clone(), probe)
}
