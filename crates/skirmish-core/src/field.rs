//! Single-writer replicated values.
//!
//! A [`ReplicatedField`] holds one authoritative value together with the
//! policy naming its only writer. Local writes are checked against the
//! caller's [`Role`]; remote updates carry a sequence number and are only
//! applied when they are not older than what is already visible, so a
//! reader never rolls back to a stale value.

use std::fmt;

use crate::authority::Role;

/// Who may write a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Only the authoritative process.
    ServerOnly,
    /// Only the owning session.
    OwnerOnly,
}

impl WritePolicy {
    /// Returns `true` if `role` may write under this policy.
    pub fn permits(self, role: Role) -> bool {
        match self {
            WritePolicy::ServerOnly => role.is_server,
            WritePolicy::OwnerOnly => role.is_owner,
        }
    }
}

/// Errors from writing a [`ReplicatedField`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// The caller is not the field's writer.
    #[error("{policy:?} field cannot be written by {role:?}")]
    WriteDenied {
        /// The field's policy.
        policy: WritePolicy,
        /// The rejected caller.
        role: Role,
    },
}

/// Handle returned by [`ReplicatedField::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Box<dyn FnMut(&T, &T) + Send + Sync>;

/// A value with one writer and any number of change subscribers.
pub struct ReplicatedField<T> {
    value: T,
    policy: WritePolicy,
    sequence: u64,
    subscribers: Vec<(SubscriptionId, Callback<T>)>,
    next_subscription: u64,
}

impl<T: Clone + PartialEq> ReplicatedField<T> {
    /// Creates a field holding `value`.
    pub fn new(value: T, policy: WritePolicy) -> Self {
        Self {
            value,
            policy,
            sequence: 0,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Current value.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// The field's write policy.
    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// Sequence of the last applied write.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Writes `value` as `role`. Returns `Ok(true)` if the value changed and
    /// subscribers were notified.
    pub fn set(&mut self, role: Role, value: T) -> Result<bool, FieldError> {
        if !self.policy.permits(role) {
            return Err(FieldError::WriteDenied {
                policy: self.policy,
                role,
            });
        }
        if value == self.value {
            return Ok(false);
        }
        self.sequence += 1;
        self.replace(value);
        Ok(true)
    }

    /// Applies an update received from the writer. Updates older than the
    /// last applied sequence are dropped. Returns `true` if applied.
    pub fn apply_remote(&mut self, sequence: u64, value: T) -> bool {
        if sequence < self.sequence {
            tracing::trace!(sequence, current = self.sequence, "stale field update");
            return false;
        }
        self.sequence = sequence;
        if value != self.value {
            self.replace(value);
        }
        true
    }

    /// Registers `callback(old, new)`, invoked after every change.
    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&T, &T) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    fn replace(&mut self, value: T) {
        let old = std::mem::replace(&mut self.value, value);
        for (_, callback) in &mut self.subscribers {
            callback(&old, &self.value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReplicatedField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatedField")
            .field("value", &self.value)
            .field("policy", &self.policy)
            .field("sequence", &self.sequence)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
