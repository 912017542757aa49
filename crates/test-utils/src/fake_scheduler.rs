use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tierflow::errors::{Result, TierflowError};
use tierflow::scheduler::{CompletionListener, JobKey, SchedulerAdapter, SubscriptionId};
use tierflow::tier::JobUnit;

/// What the fake does when a unit is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoComplete {
    /// Record only; the test reports completions with [`RecordingScheduler::complete`].
    Off,
    /// Report success synchronously from inside `trigger`.
    Succeed,
}

#[derive(Default)]
struct Inner {
    submitted: Vec<JobUnit>,
    triggered: Vec<String>,
    pending: HashMap<JobKey, JobUnit>,
    listeners: HashMap<String, (SubscriptionId, Arc<dyn CompletionListener>)>,
    subscribe_calls: usize,
    unsubscribed: Vec<String>,
    fail_submit: HashSet<String>,
    reject_subscribe: bool,
    auto: Option<AutoComplete>,
    fail_on_trigger: HashSet<String>,
}

/// A fake scheduler that:
/// - records every submitted and triggered unit
/// - lets the test deliver completions by hand (or completes synchronously)
/// - can be told to reject submissions or the listener registration.
#[derive(Clone, Default)]
pub struct RecordingScheduler {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete every triggered unit synchronously from `trigger`.
    pub fn auto_succeed() -> Self {
        let s = Self::new();
        s.inner.lock().unwrap().auto = Some(AutoComplete::Succeed);
        s
    }

    /// In auto mode, report these steps as failed instead of succeeded.
    pub fn fail_on_trigger(&self, step: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_on_trigger
            .insert(step.to_string());
    }

    /// Reject `submit` for this step name.
    pub fn fail_submit_for(&self, step: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_submit
            .insert(step.to_string());
    }

    pub fn reject_subscribe(&self) {
        self.inner.lock().unwrap().reject_subscribe = true;
    }

    /// Names of submitted units, in submission order.
    pub fn submitted(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .submitted
            .iter()
            .map(|u| u.name.clone())
            .collect()
    }

    pub fn submitted_units(&self) -> Vec<JobUnit> {
        self.inner.lock().unwrap().submitted.clone()
    }

    /// Names of triggered units, in trigger order.
    pub fn triggered(&self) -> Vec<String> {
        self.inner.lock().unwrap().triggered.clone()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.inner.lock().unwrap().subscribe_calls
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.inner.lock().unwrap().unsubscribed.clone()
    }

    pub fn has_listener(&self, group: &str) -> bool {
        self.inner.lock().unwrap().listeners.contains_key(group)
    }

    /// Deliver a completion for `step` of `group` to its listener.
    ///
    /// Returns `false` when no listener is registered for the group.
    pub fn complete(&self, group: &str, step: &str, success: bool) -> bool {
        // Clone the listener so the callback runs without our lock held;
        // it may call back into submit/trigger.
        let listener = self
            .inner
            .lock()
            .unwrap()
            .listeners
            .get(group)
            .map(|(_, l)| Arc::clone(l));
        match listener {
            Some(l) => {
                l.on_completion(step, success);
                true
            }
            None => false,
        }
    }
}

impl SchedulerAdapter for RecordingScheduler {
    fn submit(&self, unit: JobUnit) -> Result<JobKey> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_submit.contains(&unit.name) {
            return Err(TierflowError::SchedulerRegistration(format!(
                "submission of '{}' rejected",
                unit.name
            )));
        }
        let key = unit.key();
        inner.submitted.push(unit.clone());
        inner.pending.insert(key.clone(), unit);
        Ok(key)
    }

    fn trigger(&self, handle: &JobKey) -> Result<()> {
        let (auto, fail) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.pending.remove(handle).is_none() {
                return Err(TierflowError::SchedulerRegistration(format!(
                    "no submitted job '{handle}'"
                )));
            }
            inner.triggered.push(handle.name.clone());
            (inner.auto, inner.fail_on_trigger.contains(&handle.name))
        };

        if auto == Some(AutoComplete::Succeed) {
            self.complete(&handle.group, &handle.name, !fail);
        }
        Ok(())
    }

    fn subscribe(
        &self,
        group: &str,
        listener: Arc<dyn CompletionListener>,
    ) -> Result<SubscriptionId> {
        let mut inner = self.inner.lock().unwrap();
        inner.subscribe_calls += 1;
        if inner.reject_subscribe {
            return Err(TierflowError::SchedulerRegistration(
                "listener registration rejected".to_string(),
            ));
        }
        let id = SubscriptionId(inner.subscribe_calls as u64);
        inner.listeners.insert(group.to_string(), (id, listener));
        Ok(id)
    }

    fn unsubscribe(&self, group: &str, id: SubscriptionId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.listeners.get(group).is_some_and(|(current, _)| *current == id) {
            inner.listeners.remove(group);
        }
        inner.unsubscribed.push(group.to_string());
        Ok(())
    }
}
