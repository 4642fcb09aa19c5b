use chrono::{DateTime, Duration, Utc};
use shared::types::{AttemptOutcome, ReplacementAttempt, ReplacementRequest, ReplacementStatus};
use uuid::Uuid;

use crate::domain::eligibility::RankedCandidate;
use crate::error::GuardServiceError;

/// Wrapper for a request in `Pending` or `InProgress` status.
/// Every transition consumes it; terminal requests cannot be wrapped.
#[derive(Debug, Clone)]
pub struct OpenReplacement {
    inner: ReplacementRequest,
}

/// Result of contacting candidates.
#[derive(Debug)]
pub enum Advance {
    /// The request stays open; `offers` lists the members just contacted.
    Waiting {
        request: OpenReplacement,
        offers: Vec<Uuid>,
    },
    /// Nobody left to contact and nobody outstanding. Terminal `Expired`.
    Exhausted(ReplacementRequest),
}

/// Error for a transition the request can no longer take.
pub fn stale(request: &ReplacementRequest, detail: impl Into<String>) -> GuardServiceError {
    GuardServiceError::StaleStateTransition {
        request_id: request.id,
        status: request.status,
        detail: detail.into(),
    }
}

impl OpenReplacement {
    pub fn from_request(request: ReplacementRequest) -> Option<Self> {
        if request.status.is_terminal() {
            None
        } else {
            Some(Self { inner: request })
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn inner(&self) -> &ReplacementRequest {
        &self.inner
    }

    pub fn into_inner(self) -> ReplacementRequest {
        self.inner
    }

    /// Members holding an offer nobody answered yet.
    pub fn outstanding(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.inner
            .attempt_history
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Contacted)
            .map(|a| a.member_id)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.inner.status == ReplacementStatus::Pending
            || self.inner.next_attempt_at.is_some_and(|at| at <= now)
    }

    /// Timer path: expires what is outstanding, then contacts up to
    /// `per_wave` new candidates with a fresh deadline.
    pub fn open_wave(
        mut self,
        ranked: &[RankedCandidate<'_>],
        per_wave: usize,
        now: DateTime<Utc>,
        delay: Duration,
    ) -> Advance {
        self.expire_outstanding(now);
        let picked = self.pick(ranked, per_wave);
        if picked.is_empty() {
            return Advance::Exhausted(self.finish(ReplacementStatus::Expired, now));
        }

        self.inner.wave_count += 1;
        self.inner.status = ReplacementStatus::InProgress;
        let deadline = now
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.inner.next_attempt_at = Some(deadline);
        let offers = self.contact(picked, now);
        Advance::Waiting {
            request: self,
            offers,
        }
    }

    /// Records a refusal. Only a member with an outstanding offer can refuse.
    pub fn refuse(
        mut self,
        member_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self, GuardServiceError> {
        self.answer(member_id, AttemptOutcome::Refused, now)?;
        Ok(self)
    }

    /// Refills the current wave up to `per_wave` outstanding offers. New offers
    /// share the running deadline.
    pub fn fill_vacancies(
        mut self,
        ranked: &[RankedCandidate<'_>],
        per_wave: usize,
        now: DateTime<Utc>,
    ) -> Advance {
        let free = per_wave.saturating_sub(self.outstanding().count());
        let picked = self.pick(ranked, free);
        let offers = self.contact(picked, now);

        if self.outstanding().next().is_none() {
            return Advance::Exhausted(self.finish(ReplacementStatus::Expired, now));
        }
        Advance::Waiting {
            request: self,
            offers,
        }
    }

    /// Accepts on behalf of a member with an outstanding offer. Other offers
    /// of the wave are left as they are.
    pub fn accept(
        mut self,
        member_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        self.answer(member_id, AttemptOutcome::Accepted, now)?;
        self.inner.replacement_member_id = Some(member_id);
        Ok(self.finish(ReplacementStatus::Accepted, now))
    }

    /// Operator gave up on the request.
    pub fn force_expire(mut self, now: DateTime<Utc>) -> ReplacementRequest {
        self.expire_outstanding(now);
        self.finish(ReplacementStatus::Expired, now)
    }

    pub fn cancel(self, now: DateTime<Utc>) -> ReplacementRequest {
        self.finish(ReplacementStatus::Cancelled, now)
    }

    fn pick<'r, 'm>(
        &self,
        ranked: &'r [RankedCandidate<'m>],
        limit: usize,
    ) -> Vec<&'r RankedCandidate<'m>> {
        ranked
            .iter()
            .filter(|c| {
                Some(c.member.id) != self.inner.requester_id
                    && !self.inner.contacted_member_ids.contains(&c.member.id)
            })
            .take(limit)
            .collect()
    }

    fn contact(&mut self, picked: Vec<&RankedCandidate<'_>>, now: DateTime<Utc>) -> Vec<Uuid> {
        let wave = self.inner.wave_count;
        let offers: Vec<Uuid> = picked.iter().map(|c| c.member.id).collect();
        for candidate in picked {
            self.inner.attempt_history.push(ReplacementAttempt {
                member_id: candidate.member.id,
                member_name: candidate.member.name.clone(),
                wave,
                contacted_at: now,
                outcome: AttemptOutcome::Contacted,
                responded_at: None,
            });
            self.inner.contacted_member_ids.push(candidate.member.id);
        }
        self.inner.attempt_count = self.inner.attempt_history.len() as u32;
        self.inner.updated_at = now;
        offers
    }

    fn answer(
        &mut self,
        member_id: Uuid,
        outcome: AttemptOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), GuardServiceError> {
        let attempt = self
            .inner
            .attempt_history
            .iter_mut()
            .find(|a| a.member_id == member_id && a.outcome == AttemptOutcome::Contacted);
        match attempt {
            Some(attempt) => {
                attempt.outcome = outcome;
                attempt.responded_at = Some(now);
                self.inner.updated_at = now;
                Ok(())
            }
            None => Err(stale(
                &self.inner,
                format!("member {member_id} has no outstanding offer"),
            )),
        }
    }

    fn expire_outstanding(&mut self, now: DateTime<Utc>) {
        for attempt in self
            .inner
            .attempt_history
            .iter_mut()
            .filter(|a| a.outcome == AttemptOutcome::Contacted)
        {
            attempt.outcome = AttemptOutcome::Expired;
            attempt.responded_at = Some(now);
        }
    }

    fn finish(mut self, status: ReplacementStatus, now: DateTime<Utc>) -> ReplacementRequest {
        self.inner.status = status;
        self.inner.next_attempt_at = None;
        self.inner.updated_at = now;
        self.inner
    }
}
