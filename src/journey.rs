//! Screen flow of the guidance journey: profile -> suggested roles -> roadmap -> jobs.

use crate::accounts::{Accounts, AuthError, KeyValueStore};
use crate::genai::{CareerAdvisor, ChatReply, GenerativeModel};
use crate::types::{
    ChatMessage, JobListing, JobRole, RoadmapStep, SUCCESS_STORIES, User, UserProfile, VisualCue,
};

pub const GREETING: &str =
    "Namaste! I am Margdarshak. Let's talk about you. What is your name and what work do you know?";

const MENTOR_BUSY: &str = "I am a bit busy right now, but please don't give up! Keep learning.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStep {
    Welcome,
    Auth,
    Chat,
    Discovery,
    Roadmap,
    Jobs,
    Stories,
}

impl AppStep {
    /// Screen reached by the back button.
    pub fn back(self) -> Self {
        match self {
            AppStep::Discovery => AppStep::Chat,
            AppStep::Roadmap => AppStep::Discovery,
            AppStep::Jobs => AppStep::Roadmap,
            AppStep::Chat | AppStep::Stories | AppStep::Auth => AppStep::Welcome,
            AppStep::Welcome => AppStep::Welcome,
        }
    }

    /// Back button and bottom navigation are hidden on these screens.
    pub fn is_landing(self) -> bool {
        matches!(self, AppStep::Welcome | AppStep::Auth)
    }
}

pub struct JourneyController<M: GenerativeModel, S: KeyValueStore> {
    step: AppStep,
    advisor: CareerAdvisor<M>,
    accounts: Accounts<S>,
    user: Option<User>,
    profile: Option<UserProfile>,
    roles: Vec<JobRole>,
    selected_role: Option<JobRole>,
    roadmap: Vec<RoadmapStep>,
    jobs: Vec<JobListing>,
    messages: Vec<ChatMessage>,
}

impl<M: GenerativeModel, S: KeyValueStore> JourneyController<M, S> {
    pub fn new(advisor: CareerAdvisor<M>, accounts: Accounts<S>) -> Self {
        let user = accounts.current_session().unwrap_or_else(|e| {
            log::warn!("Ignoring saved session: {}", e);
            None
        });
        if let Some(u) = &user {
            log::info!("Restored session for {}", u.email);
        }
        Self {
            step: AppStep::Welcome,
            advisor,
            accounts,
            user,
            profile: None,
            roles: Vec::new(),
            selected_role: None,
            roadmap: Vec::new(),
            jobs: Vec::new(),
            messages: vec![ChatMessage::bot(GREETING)],
        }
    }

    pub fn step(&self) -> AppStep {
        self.step
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn roles(&self) -> &[JobRole] {
        &self.roles
    }

    pub fn selected_role(&self) -> Option<&JobRole> {
        self.selected_role.as_ref()
    }

    pub fn roadmap(&self) -> &[RoadmapStep] {
        &self.roadmap
    }

    pub fn jobs(&self) -> &[JobListing] {
        &self.jobs
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Picture hint for the latest chat message.
    pub fn visual_cue(&self) -> Option<VisualCue> {
        self.messages.last().and_then(|m| VisualCue::detect(&m.text))
    }

    // ======================== Navigation ========================

    pub fn go_back(&mut self) {
        self.step = self.step.back();
    }

    pub fn go_home(&mut self) {
        self.step = AppStep::Welcome;
    }

    /// Primary action of the welcome screen.
    pub fn start(&mut self) {
        self.step = if self.user.is_some() { AppStep::Chat } else { AppStep::Auth };
    }

    pub fn open_stories(&mut self) {
        self.step = AppStep::Stories;
    }

    /// Jump through the bottom navigation bar.
    pub fn navigate(&mut self, step: AppStep) {
        if self.step.is_landing() || step.is_landing() || step == AppStep::Stories {
            log::debug!("Navigation bar cannot go from {:?} to {:?}", self.step, step);
            return;
        }
        self.step = step;
    }

    // ======================== Accounts ========================

    pub fn sign_up(&mut self, name: &str, email: &str, password: &str) -> Result<&User, AuthError> {
        let user = self.accounts.sign_up(name, email, password)?;
        Ok(self.signed_in(user))
    }

    pub fn sign_in(&mut self, email: &str, password: &str) -> Result<&User, AuthError> {
        let user = self.accounts.sign_in(email, password)?;
        Ok(self.signed_in(user))
    }

    fn signed_in(&mut self, user: User) -> &User {
        self.step = AppStep::Welcome;
        self.user.insert(user)
    }

    pub fn logout(&mut self) {
        if let Err(e) = self.accounts.logout() {
            log::warn!("Failed to clear session: {}", e);
        }
        self.user = None;
        self.step = AppStep::Welcome;
    }

    // ======================== Journey ========================

    /// Record a finished spoken reply from the live assistant.
    pub fn push_bot_message(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::bot(text));
    }

    /// Typed chat turn. A reply carrying a profile finishes the interview.
    pub async fn send_chat(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let history = self.messages.clone();
        self.messages.push(ChatMessage::user(text));

        match self.advisor.chat_turn(&history, text).await {
            Ok(ChatReply::Message(reply)) => self.messages.push(ChatMessage::bot(reply)),
            Ok(ChatReply::ProfileComplete(profile)) => self.complete_profile(profile).await,
            Err(e) => log::error!("Chat request failed: {:#}", e),
        }
    }

    pub async fn complete_profile(&mut self, profile: UserProfile) {
        log::info!("Profile ready for {} ({})", profile.name, profile.location);
        if self.user.is_some() {
            match self.accounts.mark_profile_created() {
                Ok(Some(updated)) => self.user = Some(updated),
                Ok(None) => {}
                Err(e) => log::warn!("Failed to record profile status: {}", e),
            }
        }

        let result = self.advisor.discover_roles(&profile).await;
        self.profile = Some(profile);
        match result {
            Ok(roles) => {
                self.roles = roles;
                self.step = AppStep::Discovery;
            }
            Err(e) => log::error!("Role discovery failed: {:#}", e),
        }
    }

    /// Skip the interview with the built-in demo profile. Only offered on the
    /// chat screen; returns false anywhere else.
    pub async fn use_demo_profile(&mut self) -> bool {
        if self.step != AppStep::Chat {
            return false;
        }
        self.complete_profile(UserProfile::demo()).await;
        true
    }

    /// Pick one of the suggested roles (0-based) and fetch its roadmap.
    pub async fn select_role(&mut self, index: usize) -> bool {
        let Some(role) = self.roles.get(index).cloned() else {
            return false;
        };
        self.selected_role = Some(role.clone());
        let Some(profile) = &self.profile else {
            return true;
        };
        match self.advisor.roadmap(&role, profile).await {
            Ok(steps) => {
                self.roadmap = steps;
                self.step = AppStep::Roadmap;
            }
            Err(e) => log::error!("Roadmap request failed: {:#}", e),
        }
        true
    }

    pub async fn continue_to_jobs(&mut self) {
        let (Some(role), Some(profile)) = (&self.selected_role, &self.profile) else {
            return;
        };
        match self.advisor.recommended_jobs(role, profile).await {
            Ok(jobs) => {
                self.jobs = jobs;
                self.step = AppStep::Jobs;
            }
            Err(e) => log::error!("Job listing request failed: {:#}", e),
        }
    }

    /// Ask the mentor behind a success story. `None` for an unknown story or a blank question.
    pub async fn ask_mentor(&self, story: usize, question: &str) -> Option<String> {
        let mentor = SUCCESS_STORIES.get(story)?;
        if question.trim().is_empty() {
            return None;
        }
        let advice = self
            .advisor
            .mentor_advice(mentor.name, &mentor.mentor_background(), question)
            .await
            .unwrap_or_else(|e| {
                log::error!("Mentor advice failed: {:#}", e);
                MENTOR_BUSY.to_string()
            });
        Some(advice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::FileStore;
    use crate::genai::tests::ScriptedModel;
    use anyhow::anyhow;
    use std::sync::Arc;
    use tempfile::TempDir;

    const ROLES: &str = r#"[
        {"id":"1","title":"Delivery Partner","description":"","averageSalary":"18k","demandLevel":"High","matchScore":90,"icon":"Delivery"},
        {"id":"2","title":"Driver","description":"","averageSalary":"22k","demandLevel":"Medium","matchScore":80,"icon":"Driver"}
    ]"#;
    const STEPS: &str = r#"[{"title":"Licence","description":"","duration":"2 weeks","status":"current"}]"#;
    const JOBS: &str = r#"[{"id":"j1","title":"Rider","company":"Zomato","location":"Mumbai","salary":"20k","tags":[],"postedAt":"today"}]"#;

    struct Fixture {
        journey: JourneyController<Arc<ScriptedModel>, FileStore>,
        model: Arc<ScriptedModel>,
        _dir: TempDir,
    }

    fn fixture(replies: Vec<anyhow::Result<String>>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();
        let model = Arc::new(ScriptedModel::with(replies));
        let journey = JourneyController::new(CareerAdvisor::new(model.clone(), 0.7), Accounts::new(store));
        Fixture { journey, model, _dir: dir }
    }

    #[test]
    fn back_button_mapping() {
        use AppStep::*;
        let pairs = [
            (Discovery, Chat),
            (Roadmap, Discovery),
            (Jobs, Roadmap),
            (Chat, Welcome),
            (Stories, Welcome),
            (Auth, Welcome),
            (Welcome, Welcome),
        ];
        for (from, to) in pairs {
            assert_eq!(from.back(), to, "back from {:?}", from);
        }
    }

    #[test]
    fn start_depends_on_sign_in() {
        let mut f = fixture(vec![]);
        f.journey.start();
        assert_eq!(f.journey.step(), AppStep::Auth);

        f.journey.sign_up("Asha", "asha@example.com", "pw").unwrap();
        assert_eq!(f.journey.step(), AppStep::Welcome);
        f.journey.start();
        assert_eq!(f.journey.step(), AppStep::Chat);

        f.journey.logout();
        assert!(f.journey.user().is_none());
        assert_eq!(f.journey.step(), AppStep::Welcome);
    }

    #[test]
    fn navigation_bar_is_hidden_on_landing_screens() {
        let mut f = fixture(vec![]);
        f.journey.navigate(AppStep::Jobs);
        assert_eq!(f.journey.step(), AppStep::Welcome);

        f.journey.open_stories();
        f.journey.navigate(AppStep::Roadmap);
        assert_eq!(f.journey.step(), AppStep::Roadmap);
    }

    #[tokio::test]
    async fn full_journey_reaches_jobs() {
        let mut f = fixture(vec![
            Ok(r#"Thanks! {"name":"Ravi","location":"Mumbai","skills":["Driving"]}"#.into()),
            Ok(ROLES.into()),
            Ok(STEPS.into()),
            Ok(JOBS.into()),
        ]);
        f.journey.sign_up("Ravi", "ravi@example.com", "pw").unwrap();
        f.journey.start();

        f.journey.send_chat("I am done").await;
        assert_eq!(f.journey.step(), AppStep::Discovery);
        assert_eq!(f.journey.roles().len(), 2);
        assert_eq!(f.journey.profile().unwrap().name, "Ravi");
        assert!(f.journey.user().unwrap().profile_created);

        assert!(f.journey.select_role(1).await);
        assert_eq!(f.journey.step(), AppStep::Roadmap);
        assert_eq!(f.journey.selected_role().unwrap().title, "Driver");
        assert_eq!(f.journey.roadmap().len(), 1);

        f.journey.continue_to_jobs().await;
        assert_eq!(f.journey.step(), AppStep::Jobs);
        assert_eq!(f.journey.jobs()[0].company, "Zomato");
        assert!(f.model.last_request().contents.contains("\"Driver\""));
    }

    #[tokio::test]
    async fn failed_requests_leave_the_screen_alone() {
        let mut f = fixture(vec![Err(anyhow!("offline")), Err(anyhow!("offline"))]);
        f.journey.start();
        f.journey.complete_profile(UserProfile::demo()).await;
        assert_eq!(f.journey.step(), AppStep::Auth);
        assert!(f.journey.roles().is_empty());

        f.journey.send_chat("hello").await;
        assert_eq!(f.journey.messages().len(), 2);
        assert_eq!(f.journey.step(), AppStep::Auth);
    }

    #[tokio::test]
    async fn chat_keeps_history_and_cues() {
        let mut f = fixture(vec![Ok("Do you have a bike?".into())]);
        f.journey.send_chat("   ").await;
        assert_eq!(f.journey.messages().len(), 1);

        f.journey.send_chat("Ravi").await;
        assert_eq!(f.journey.messages().len(), 3);
        assert_eq!(f.journey.visual_cue(), Some(VisualCue::Bike));
        assert_eq!(f.model.last_request().contents, format!("bot: {}\nuser: Ravi", GREETING));
    }

    #[tokio::test]
    async fn demo_profile_only_from_the_chat_screen() {
        let mut f = fixture(vec![Ok(ROLES.into())]);
        assert!(!f.journey.use_demo_profile().await);
        f.journey.open_stories();
        assert!(!f.journey.use_demo_profile().await);
        assert_eq!(f.journey.step(), AppStep::Stories);
        assert!(f.journey.profile().is_none());
        assert!(f.model.requests.lock().unwrap().is_empty());

        f.journey.sign_up("Asha", "asha@example.com", "pw").unwrap();
        f.journey.start();
        assert!(f.journey.use_demo_profile().await);
        assert_eq!(f.journey.step(), AppStep::Discovery);
        assert_eq!(f.journey.profile(), Some(&UserProfile::demo()));
    }

    #[tokio::test]
    async fn unknown_role_index_is_ignored() {
        let mut f = fixture(vec![]);
        assert!(!f.journey.select_role(0).await);
        assert!(f.model.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mentor_falls_back_when_busy() {
        let f = fixture(vec![Err(anyhow!("quota")), Ok("Seekhte raho!".into())]);
        assert_eq!(f.journey.ask_mentor(9, "How?").await, None);
        assert_eq!(f.journey.ask_mentor(0, "  ").await, None);
        assert_eq!(f.journey.ask_mentor(0, "How?").await.as_deref(), Some(MENTOR_BUSY));
        assert_eq!(f.journey.ask_mentor(2, "How?").await.as_deref(), Some("Seekhte raho!"));
        assert!(f.model.last_request().contents.starts_with("You are Vijay Singh."));
    }
}
