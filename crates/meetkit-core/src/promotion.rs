use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};

use crate::errors::MeetingError;
use crate::observer::MainContext;
use crate::status::{MeetingSessionStatus, MeetingSessionStatusCode};

/// Credentials of the primary meeting attendee, obtained out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingSessionCredentials {
    pub attendee_id: String,
    pub external_user_id: String,
    pub join_token: String,
}

/// One media subsystem (audio or video) that can join a primary meeting.
#[async_trait]
pub trait PrimaryMeetingClient: Send + Sync {
    /// Resolves once the subsystem has accepted or refused the promotion.
    async fn promote(&self, credentials: &MeetingSessionCredentials) -> MeetingSessionStatusCode;

    fn demote(&self);
}

pub trait PrimaryMeetingPromotionObserver: Send + Sync {
    fn did_promote_to_primary_meeting(&self, status: MeetingSessionStatus);

    fn did_demote_from_primary_meeting(&self, status: MeetingSessionStatus);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subsystem {
    Audio,
    Video,
}

#[derive(Default)]
struct PromotionState {
    in_flight: bool,
    promoted: bool,
    demoted_in_flight: Option<(Subsystem, MeetingSessionStatusCode)>,
    observer: Option<Arc<dyn PrimaryMeetingPromotionObserver>>,
}

/// Holds the in-flight slot of one promotion until it completes or is dropped.
struct InFlight<'a> {
    state: &'a Mutex<PromotionState>,
    active: bool,
}

impl<'a> InFlight<'a> {
    fn new(state: &'a Mutex<PromotionState>) -> Self {
        Self { state, active: true }
    }

    fn complete(mut self) -> MutexGuard<'a, PromotionState> {
        self.active = false;
        let state: &'a Mutex<PromotionState> = self.state;
        let mut state = state.lock();
        state.in_flight = false;
        state
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let mut state = self.state.lock();
        state.in_flight = false;
        state.demoted_in_flight = None;
        tracing::debug!("primary meeting promotion cancelled");
    }
}

/// Joins audio and video promotion into a single primary-meeting outcome.
///
/// A half-successful promotion is rolled back so both subsystems always
/// agree. The observer passed to the last promotion receives every
/// outcome and demotion on the main context.
pub struct PrimaryMeetingCoordinator {
    main: MainContext,
    audio: Arc<dyn PrimaryMeetingClient>,
    video: Arc<dyn PrimaryMeetingClient>,
    state: Mutex<PromotionState>,
}

impl PrimaryMeetingCoordinator {
    pub fn new(
        main: MainContext,
        audio: Arc<dyn PrimaryMeetingClient>,
        video: Arc<dyn PrimaryMeetingClient>,
    ) -> Self {
        Self {
            main,
            audio,
            video,
            state: Mutex::new(PromotionState::default()),
        }
    }

    pub fn is_promoted(&self) -> bool {
        self.state.lock().promoted
    }

    /// Promote both subsystems concurrently and report one outcome.
    ///
    /// Fails with `StateConflict` while another promotion is in flight; the
    /// stored observer is left untouched in that case. A subsystem demoted
    /// while the promotion is in flight counts as failed with its demotion
    /// status. Dropping the returned future releases the in-flight slot.
    pub async fn promote_to_primary_meeting(
        &self,
        credentials: MeetingSessionCredentials,
        observer: Arc<dyn PrimaryMeetingPromotionObserver>,
    ) -> Result<(), MeetingError> {
        let in_flight = {
            let mut state = self.state.lock();
            if state.in_flight {
                return Err(MeetingError::StateConflict(
                    "primary meeting promotion already in flight".to_string(),
                ));
            }
            state.in_flight = true;
            state.demoted_in_flight = None;
            state.observer = Some(observer);
            InFlight::new(&self.state)
        };

        tracing::info!("promoting to primary meeting as {}", credentials.attendee_id);
        let (mut audio_status, mut video_status) = tokio::join!(
            self.audio.promote(&credentials),
            self.video.promote(&credentials)
        );

        let (outcome, rollback, observer) = {
            let mut state = in_flight.complete();
            if let Some((subsystem, status)) = state.demoted_in_flight.take() {
                let status = if status.is_ok() { MeetingSessionStatusCode::Unknown } else { status };
                match subsystem {
                    Subsystem::Audio => audio_status = status,
                    Subsystem::Video => video_status = status,
                }
            }
            let (outcome, rollback) = resolve(audio_status, video_status);
            state.promoted = outcome.is_ok();
            (outcome, rollback, state.observer.clone())
        };

        match rollback {
            Some(Subsystem::Audio) => {
                tracing::warn!("video promotion failed ({video_status}), demoting audio");
                self.audio.demote();
            }
            Some(Subsystem::Video) => {
                tracing::warn!("audio promotion failed ({audio_status}), demoting video");
                self.video.demote();
            }
            None => {}
        }
        if let Some(observer) = observer {
            self.main.run(move || {
                observer.did_promote_to_primary_meeting(MeetingSessionStatus::new(outcome))
            });
        }
        Ok(())
    }

    /// Leave the primary meeting. Reports `Ok` immediately.
    pub fn demote_from_primary_meeting(&self) {
        self.audio.demote();
        self.video.demote();
        let observer = {
            let mut state = self.state.lock();
            state.promoted = false;
            state.observer.clone()
        };
        if let Some(observer) = observer {
            self.main.run(move || {
                observer.did_demote_from_primary_meeting(MeetingSessionStatus::ok())
            });
        }
    }

    /// The audio subsystem left the primary meeting on its own.
    pub fn on_audio_demoted(&self, status: MeetingSessionStatusCode) {
        self.on_demoted(Subsystem::Audio, status);
    }

    /// The video subsystem left the primary meeting on its own.
    pub fn on_video_demoted(&self, status: MeetingSessionStatusCode) {
        self.on_demoted(Subsystem::Video, status);
    }

    fn on_demoted(&self, subsystem: Subsystem, status: MeetingSessionStatusCode) {
        let (observer, demote_sibling) = {
            let mut state = self.state.lock();
            if state.in_flight {
                if state.demoted_in_flight.is_some() {
                    return;
                }
                // Sibling is demoted once its promote resolves.
                state.demoted_in_flight = Some((subsystem, status));
                (state.observer.clone(), false)
            } else if state.promoted {
                state.promoted = false;
                (state.observer.clone(), true)
            } else {
                tracing::debug!("{subsystem:?} demoted while not promoted, ignoring");
                return;
            }
        };

        tracing::info!("{subsystem:?} demoted from primary meeting ({status})");
        if demote_sibling {
            match subsystem {
                Subsystem::Audio => self.video.demote(),
                Subsystem::Video => self.audio.demote(),
            }
        }
        if let Some(observer) = observer {
            self.main.run(move || {
                observer.did_demote_from_primary_meeting(MeetingSessionStatus::new(status))
            });
        }
    }
}

/// Outcome of a joined promotion and the subsystem to roll back, if any.
fn resolve(
    audio: MeetingSessionStatusCode,
    video: MeetingSessionStatusCode,
) -> (MeetingSessionStatusCode, Option<Subsystem>) {
    match (audio.is_ok(), video.is_ok()) {
        (true, true) | (false, false) => (video, None),
        (true, false) => (video, Some(Subsystem::Audio)),
        (false, true) => (audio, Some(Subsystem::Video)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use MeetingSessionStatusCode as Code;

    struct ScriptedClient {
        status: Code,
        gate: Option<Arc<Notify>>,
        promotes: AtomicUsize,
        demotes: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(status: Code) -> Arc<Self> {
            Arc::new(Self {
                status,
                gate: None,
                promotes: AtomicUsize::new(0),
                demotes: AtomicUsize::new(0),
            })
        }

        fn gated(status: Code, gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                status,
                gate: Some(gate),
                promotes: AtomicUsize::new(0),
                demotes: AtomicUsize::new(0),
            })
        }

        fn demotes(&self) -> usize {
            self.demotes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PrimaryMeetingClient for ScriptedClient {
        async fn promote(&self, _credentials: &MeetingSessionCredentials) -> Code {
            self.promotes.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.status
        }

        fn demote(&self) {
            self.demotes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        promoted: parking_lot::Mutex<Vec<Code>>,
        demoted: parking_lot::Mutex<Vec<Code>>,
    }

    impl PrimaryMeetingPromotionObserver for RecordingObserver {
        fn did_promote_to_primary_meeting(&self, status: MeetingSessionStatus) {
            self.promoted.lock().push(status.status_code);
        }

        fn did_demote_from_primary_meeting(&self, status: MeetingSessionStatus) {
            self.demoted.lock().push(status.status_code);
        }
    }

    fn credentials() -> MeetingSessionCredentials {
        MeetingSessionCredentials {
            attendee_id: "primary-attendee".to_string(),
            external_user_id: "user".to_string(),
            join_token: "token".to_string(),
        }
    }

    fn setup(
        audio: Arc<ScriptedClient>,
        video: Arc<ScriptedClient>,
    ) -> (PrimaryMeetingCoordinator, MainContext, Arc<RecordingObserver>) {
        let main = MainContext::new("promotion-test").unwrap();
        let coordinator = PrimaryMeetingCoordinator::new(main.clone(), audio, video);
        (coordinator, main, Arc::new(RecordingObserver::default()))
    }

    #[tokio::test]
    async fn test_both_succeed_reports_ok() {
        let audio = ScriptedClient::new(Code::Ok);
        let video = ScriptedClient::new(Code::Ok);
        let (coordinator, main, observer) = setup(audio.clone(), video.clone());

        coordinator
            .promote_to_primary_meeting(credentials(), observer.clone())
            .await
            .unwrap();
        main.sync(|| ());

        assert_eq!(*observer.promoted.lock(), vec![Code::Ok]);
        assert!(coordinator.is_promoted());
        assert_eq!(audio.demotes() + video.demotes(), 0);
    }

    #[tokio::test]
    async fn test_video_failure_demotes_audio_once() {
        let audio = ScriptedClient::new(Code::Ok);
        let video = ScriptedClient::new(Code::VideoServiceUnavailable);
        let (coordinator, main, observer) = setup(audio.clone(), video.clone());

        coordinator
            .promote_to_primary_meeting(credentials(), observer.clone())
            .await
            .unwrap();
        main.sync(|| ());

        assert_eq!(*observer.promoted.lock(), vec![Code::VideoServiceUnavailable]);
        assert_eq!(audio.demotes(), 1);
        assert_eq!(video.demotes(), 0);
        assert!(!coordinator.is_promoted());
    }

    #[tokio::test]
    async fn test_audio_failure_demotes_video_and_reports_audio_status() {
        let audio = ScriptedClient::new(Code::AudioCallAtCapacity);
        let video = ScriptedClient::new(Code::Ok);
        let (coordinator, main, observer) = setup(audio.clone(), video.clone());

        coordinator
            .promote_to_primary_meeting(credentials(), observer.clone())
            .await
            .unwrap();
        main.sync(|| ());

        assert_eq!(*observer.promoted.lock(), vec![Code::AudioCallAtCapacity]);
        assert_eq!(video.demotes(), 1);
        assert_eq!(audio.demotes(), 0);
    }

    #[tokio::test]
    async fn test_both_fail_reports_video_without_rollback() {
        let audio = ScriptedClient::new(Code::AudioAuthenticationRejected);
        let video = ScriptedClient::new(Code::VideoServiceUnavailable);
        let (coordinator, main, observer) = setup(audio.clone(), video.clone());

        coordinator
            .promote_to_primary_meeting(credentials(), observer.clone())
            .await
            .unwrap();
        main.sync(|| ());

        assert_eq!(*observer.promoted.lock(), vec![Code::VideoServiceUnavailable]);
        assert_eq!(audio.demotes() + video.demotes(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_promotion_is_rejected() {
        let gate = Arc::new(Notify::new());
        let audio = ScriptedClient::gated(Code::Ok, gate.clone());
        let video = ScriptedClient::new(Code::Ok);
        let (coordinator, main, first) = setup(audio.clone(), video);
        let coordinator = Arc::new(coordinator);

        let in_flight = {
            let coordinator = coordinator.clone();
            let first = first.clone();
            tokio::spawn(async move { coordinator.promote_to_primary_meeting(credentials(), first).await })
        };
        while audio.promotes.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let second = Arc::new(RecordingObserver::default());
        let err = coordinator
            .promote_to_primary_meeting(credentials(), second.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, MeetingError::StateConflict(_)));

        gate.notify_one();
        in_flight.await.unwrap().unwrap();
        main.sync(|| ());

        assert_eq!(*first.promoted.lock(), vec![Code::Ok]);
        assert!(second.promoted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_spontaneous_demotion_demotes_sibling_once() {
        let audio = ScriptedClient::new(Code::Ok);
        let video = ScriptedClient::new(Code::Ok);
        let (coordinator, main, observer) = setup(audio.clone(), video.clone());
        coordinator
            .promote_to_primary_meeting(credentials(), observer.clone())
            .await
            .unwrap();

        coordinator.on_audio_demoted(Code::AudioAuthenticationRejected);
        coordinator.on_video_demoted(Code::Ok);
        main.sync(|| ());

        assert_eq!(video.demotes(), 1);
        assert_eq!(audio.demotes(), 0);
        assert_eq!(*observer.demoted.lock(), vec![Code::AudioAuthenticationRejected]);
    }

    #[tokio::test]
    async fn test_demotion_during_promotion_fails_the_promotion() {
        let gate = Arc::new(Notify::new());
        let audio = ScriptedClient::new(Code::Ok);
        let video = ScriptedClient::gated(Code::Ok, gate.clone());
        let (coordinator, main, observer) = setup(audio.clone(), video.clone());
        let coordinator = Arc::new(coordinator);

        let in_flight = {
            let coordinator = coordinator.clone();
            let observer = observer.clone();
            tokio::spawn(async move { coordinator.promote_to_primary_meeting(credentials(), observer).await })
        };
        while video.promotes.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        coordinator.on_audio_demoted(Code::AudioServerHungup);
        gate.notify_one();
        in_flight.await.unwrap().unwrap();
        main.sync(|| ());

        assert_eq!(*observer.demoted.lock(), vec![Code::AudioServerHungup]);
        assert_eq!(*observer.promoted.lock(), vec![Code::AudioServerHungup]);
        assert_eq!(video.demotes(), 1);
        assert_eq!(audio.demotes(), 0);
        assert!(!coordinator.is_promoted());
    }

    #[tokio::test]
    async fn test_cancelled_promotion_releases_in_flight_slot() {
        let gate = Arc::new(Notify::new());
        let audio = ScriptedClient::gated(Code::Ok, gate.clone());
        let video = ScriptedClient::new(Code::Ok);
        let (coordinator, main, observer) = setup(audio.clone(), video.clone());

        let first = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            coordinator.promote_to_primary_meeting(credentials(), observer.clone()),
        )
        .await;
        assert!(first.is_err());

        gate.notify_one();
        coordinator
            .promote_to_primary_meeting(credentials(), observer.clone())
            .await
            .unwrap();
        main.sync(|| ());

        assert_eq!(*observer.promoted.lock(), vec![Code::Ok]);
        assert!(coordinator.is_promoted());
    }

    #[tokio::test]
    async fn test_demote_reports_ok_immediately() {
        let audio = ScriptedClient::new(Code::Ok);
        let video = ScriptedClient::new(Code::Ok);
        let (coordinator, main, observer) = setup(audio.clone(), video.clone());
        coordinator
            .promote_to_primary_meeting(credentials(), observer.clone())
            .await
            .unwrap();

        coordinator.demote_from_primary_meeting();
        coordinator.on_audio_demoted(Code::Ok);
        main.sync(|| ());

        assert_eq!(audio.demotes(), 1);
        assert_eq!(video.demotes(), 1);
        assert_eq!(*observer.demoted.lock(), vec![Code::Ok]);
        assert!(!coordinator.is_promoted());
    }
}
