//! One UI session: the selected image, the client, and the last outcome.
//!
//! While an analysis is in flight the session refuses to change the
//! selection or the client, and every armed analysis carries a [`Ticket`]
//! so an outcome for a superseded selection is never shown.

use crate::client::{AnalysisClient, PendingAnalysis};
use crate::error::AnalysisError;
use crate::upload::{AcceptedUpload, UploadCandidate};
use crate::AnalysisResult;
use std::sync::Arc;

/// What the presentation layer renders after an analysis or a selection.
pub type Outcome = Result<AnalysisResult, AnalysisError>;

/// Identifies the selection an analysis was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

pub struct Session {
    client: Arc<AnalysisClient>,
    selected: Option<AcceptedUpload>,
    outcome: Option<Outcome>,
    // Bumped whenever the selection changes.
    generation: u64,
}

impl Session {
    pub fn new(client: Arc<AnalysisClient>) -> Self {
        Self {
            client,
            selected: None,
            outcome: None,
            generation: 0,
        }
    }

    pub fn client(&self) -> &Arc<AnalysisClient> {
        &self.client
    }

    /// Swaps in a client built from new settings. Refused with
    /// [`AnalysisError::Busy`] while an analysis is running. The current
    /// selection is checked again against the new upload ceiling.
    pub fn replace_client(&mut self, client: Arc<AnalysisClient>) -> Result<(), AnalysisError> {
        if self.is_busy() {
            tracing::debug!("client swap refused while an analysis is running");
            return Err(AnalysisError::Busy);
        }
        self.client = client;
        if let Some(current) = self.selected.take() {
            match self.client.validator().validate(current.into_inner()) {
                Ok(accepted) => self.selected = Some(accepted),
                Err(reason) => {
                    tracing::info!("selection dropped after settings change: {reason}");
                    self.generation += 1;
                }
            }
        }
        Ok(())
    }

    /// Validates a newly selected file. Acceptance discards the previous
    /// outcome; rejection clears the selection and becomes the outcome.
    /// While an analysis is running nothing changes and `Busy` is returned.
    pub fn select(&mut self, candidate: UploadCandidate) -> Result<&AcceptedUpload, AnalysisError> {
        if self.is_busy() {
            tracing::debug!(file = %candidate.file_name, "selection refused while busy");
            return Err(AnalysisError::Busy);
        }
        self.generation += 1;
        self.outcome = None;
        match self.client.validator().validate(candidate) {
            Ok(accepted) => {
                tracing::debug!(
                    file = %accepted.file_name,
                    size = accepted.size,
                    "image accepted"
                );
                Ok(&*self.selected.insert(accepted))
            }
            Err(reason) => {
                tracing::info!("image rejected: {reason}");
                self.selected = None;
                let err = AnalysisError::from(reason);
                self.outcome = Some(Err(err.clone()));
                Err(err)
            }
        }
    }

    pub fn selected(&self) -> Option<&AcceptedUpload> {
        self.selected.as_ref()
    }

    /// Forgets the selection and any outcome.
    pub fn clear(&mut self) -> Result<(), AnalysisError> {
        if self.is_busy() {
            return Err(AnalysisError::Busy);
        }
        self.generation += 1;
        self.selected = None;
        self.outcome = None;
        Ok(())
    }

    pub fn is_busy(&self) -> bool {
        self.client.is_busy()
    }

    /// Whether the analyze trigger should be enabled.
    pub fn can_analyze(&self) -> bool {
        self.selected.is_some() && !self.is_busy()
    }

    /// Arms an analysis of the selected image. The pending analysis is
    /// `'static`, so a UI shell can spawn it and hand the outcome back
    /// through [`Session::record_analysis`] with the ticket.
    pub fn begin_analysis(&self) -> Result<(Ticket, PendingAnalysis), AnalysisError> {
        let upload = self.selected.as_ref().ok_or(AnalysisError::NoSelection)?;
        Ok((Ticket(self.generation), self.client.analyze(upload)))
    }

    /// Runs an analysis of the selected image and records its outcome.
    pub async fn analyze(&mut self) -> Outcome {
        match self.begin_analysis() {
            Ok((ticket, pending)) => {
                let outcome = pending.await;
                self.record_analysis(ticket, outcome.clone());
                outcome
            }
            Err(e) => {
                self.record(Err(e.clone()));
                Err(e)
            }
        }
    }

    /// Records the outcome of an analysis started with `ticket`. Returns
    /// false and drops it when the selection has changed since.
    pub fn record_analysis(&mut self, ticket: Ticket, outcome: Outcome) -> bool {
        if ticket.0 != self.generation {
            tracing::debug!("dropping outcome for a superseded selection");
            return false;
        }
        self.record(outcome);
        true
    }

    /// Stores an outcome for display. A `Busy` rejection is not stored, since
    /// the analysis already in flight will deliver the real outcome.
    pub fn record(&mut self, outcome: Outcome) {
        if matches!(outcome, Err(AnalysisError::Busy)) {
            return;
        }
        self.outcome = Some(outcome);
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.outcome.as_ref().and_then(|o| o.as_ref().ok())
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        self.outcome.as_ref().and_then(|o| o.as_ref().err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::error::Rejection;
    use crate::{Diagnosis, ImageRef};

    fn session(max_upload_bytes: u64) -> Session {
        let cfg = ClientConfig {
            max_upload_bytes,
            ..ClientConfig::with_endpoint("http://127.0.0.1:9/analyze")
        };
        Session::new(Arc::new(AnalysisClient::new(&cfg).unwrap()))
    }

    fn image(size: usize) -> UploadCandidate {
        UploadCandidate::from_bytes("mole.jpg", "image/jpeg", vec![0u8; size])
    }

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            diagnosis: Diagnosis::Benign,
            confidence: 0.9,
            overlay: ImageRef::new("data:image/png;base64,AAAA"),
            preprocessed: None,
        }
    }

    #[test]
    fn fresh_session_cannot_analyze() {
        let s = session(1024);
        assert!(s.selected().is_none());
        assert!(!s.can_analyze());
        assert!(matches!(s.begin_analysis(), Err(AnalysisError::NoSelection)));
    }

    #[test]
    fn accepted_selection_discards_previous_outcome() {
        let mut s = session(1024);
        s.record(Ok(sample_result()));
        assert!(s.result().is_some());

        s.select(image(10)).unwrap();
        assert!(s.outcome().is_none());
        assert!(s.can_analyze());
    }

    #[test]
    fn rejected_selection_clears_selection_and_reports() {
        let mut s = session(1024);
        s.select(image(10)).unwrap();
        let reason = s.select(image(2048)).unwrap_err();
        assert_eq!(
            reason,
            AnalysisError::Rejected(Rejection::TooLarge {
                size: 2048,
                limit: 1024
            })
        );
        assert!(s.selected().is_none());
        assert!(s.error().is_some_and(AnalysisError::is_bad_file));
    }

    #[test]
    fn busy_rejection_does_not_replace_outcome() {
        let mut s = session(1024);
        s.record(Ok(sample_result()));
        s.record(Err(AnalysisError::Busy));
        assert!(s.result().is_some());
    }

    #[test]
    fn new_client_rechecks_selection() {
        let mut s = session(1024);
        s.select(image(512)).unwrap();
        s.record(Ok(sample_result()));

        let smaller = ClientConfig {
            max_upload_bytes: 256,
            ..ClientConfig::with_endpoint("http://127.0.0.1:9/analyze")
        };
        s.replace_client(Arc::new(AnalysisClient::new(&smaller).unwrap()))
            .unwrap();
        assert!(s.selected().is_none());
        assert!(s.result().is_some());
    }

    #[tokio::test]
    async fn analyze_without_selection_records_no_selection() {
        let mut s = session(1024);
        let outcome = s.analyze().await;
        assert_eq!(outcome, Err(AnalysisError::NoSelection));
        assert_eq!(s.error(), Some(&AnalysisError::NoSelection));
    }

    #[test]
    fn selection_is_refused_while_analysis_runs() {
        let mut s = session(1024);
        s.select(UploadCandidate::from_bytes("old.jpg", "image/jpeg", vec![0u8; 8]))
            .unwrap();
        let (ticket, pending) = s.begin_analysis().unwrap();
        assert!(s.is_busy());

        let refused = s.select(UploadCandidate::from_bytes("new.jpg", "image/jpeg", vec![0u8; 8]));
        assert_eq!(refused.unwrap_err(), AnalysisError::Busy);
        assert!(matches!(s.clear(), Err(AnalysisError::Busy)));
        assert_eq!(s.selected().map(|u| u.file_name.as_str()), Some("old.jpg"));

        drop(pending);
        assert!(s.record_analysis(ticket, Ok(sample_result())));
        assert!(s.result().is_some());
    }

    #[test]
    fn outcome_for_superseded_selection_is_dropped() {
        let mut s = session(1024);
        s.select(UploadCandidate::from_bytes("old.jpg", "image/jpeg", vec![0u8; 8]))
            .unwrap();
        let (ticket, pending) = s.begin_analysis().unwrap();
        // The exchange ended but its outcome has not been handed back yet.
        drop(pending);

        s.select(UploadCandidate::from_bytes("new.jpg", "image/jpeg", vec![0u8; 8]))
            .unwrap();
        assert!(!s.record_analysis(ticket, Ok(sample_result())));
        assert_eq!(s.selected().map(|u| u.file_name.as_str()), Some("new.jpg"));
        assert!(s.outcome().is_none());
    }

    #[test]
    fn client_swap_is_refused_while_analysis_runs() {
        let mut s = session(1024);
        s.select(image(10)).unwrap();
        let (_ticket, pending) = s.begin_analysis().unwrap();

        let other = ClientConfig::with_endpoint("http://127.0.0.1:9/analyze");
        let refused = s.replace_client(Arc::new(AnalysisClient::new(&other).unwrap()));
        assert_eq!(refused, Err(AnalysisError::Busy));
        assert!(s.is_busy());
        assert!(!s.can_analyze());

        drop(pending);
        assert!(!s.is_busy());
        assert!(s
            .replace_client(Arc::new(AnalysisClient::new(&other).unwrap()))
            .is_ok());
    }
}
