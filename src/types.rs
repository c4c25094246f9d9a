//! Career-guidance domain data, shaped like the JSON the generative service returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub profile_created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub salary: String,
    pub hours: String,
    pub transport: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub location: String,
    pub skills: Vec<String>,
    pub education: String,
    pub experience: String,
    pub preferences: Preferences,
    pub interests: Vec<String>,
}

impl UserProfile {
    /// Profile used by the demo shortcut.
    pub fn demo() -> Self {
        Self {
            name: "Rajesh".into(),
            location: "Mumbai".into(),
            skills: vec!["Driving".into(), "Basic Repair".into()],
            education: "10th Pass".into(),
            experience: "2 years".into(),
            preferences: Preferences {
                salary: "25k".into(),
                hours: "Full-time".into(),
                transport: "Own Bike".into(),
            },
            interests: vec!["Logistics".into()],
        }
    }

    /// Build a profile from the loose JSON the assistant emits at the end of a chat.
    /// Missing fields get friendly defaults.
    pub fn from_assistant_json(v: &Value) -> Self {
        let text = |key: &str, default: &str| {
            v.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        let skills: Vec<String> = v
            .get("skills")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            name: text("name", "User"),
            location: text("location", "India"),
            interests: skills.clone(),
            skills,
            education: text("education", "Not specified"),
            experience: text("experience", "New to workforce"),
            preferences: Preferences {
                salary: text("salaryPreference", "Competitive"),
                hours: "Full-time".into(),
                transport: text("transport", "None"),
            },
        }
    }
}

/// Pull a profile out of a free-text reply: everything from the first `{` to the
/// last `}` must parse as a JSON object.
pub fn extract_profile(reply: &str) -> Option<UserProfile> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&reply[start..=end]) {
        Ok(v) if v.is_object() => Some(UserProfile::from_assistant_json(&v)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemandLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRole {
    pub id: String,
    pub title: String,
    pub description: String,
    pub average_salary: String,
    pub demand_level: DemandLevel,
    pub match_score: f64,
    pub icon: String,
}

impl JobRole {
    pub fn icon_kind(&self) -> RoleIcon {
        RoleIcon::from_keyword(&self.icon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Completed,
    Current,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapStep {
    pub title: String,
    pub description: String,
    pub duration: String,
    pub status: StepStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListing {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub posted_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleIcon {
    Delivery,
    Driver,
    Mechanic,
    Chef,
    Security,
    Retail,
    Construction,
    Technician,
    Generic,
}

impl RoleIcon {
    pub const KEYWORDS: [&'static str; 8] = [
        "Delivery",
        "Driver",
        "Mechanic",
        "Chef",
        "Security",
        "Retail",
        "Construction",
        "Technician",
    ];

    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "delivery" => Self::Delivery,
            "driver" => Self::Driver,
            "mechanic" => Self::Mechanic,
            "chef" => Self::Chef,
            "security" => Self::Security,
            "retail" => Self::Retail,
            "construction" => Self::Construction,
            "technician" => Self::Technician,
            _ => Self::Generic,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Delivery => "🛵",
            Self::Driver => "🚚",
            Self::Mechanic => "🔧",
            Self::Chef => "🍳",
            Self::Security => "🛡",
            Self::Retail => "🛍",
            Self::Construction => "👷",
            Self::Technician => "📱",
            Self::Generic => "💼",
        }
    }
}

/// Picture hint for users who read little: chosen from keywords in the last message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualCue {
    Bike,
    Tools,
    Map,
    Education,
    Money,
}

impl VisualCue {
    pub fn detect(message: &str) -> Option<Self> {
        let m = message.to_lowercase();
        let any = |words: &[&str]| words.iter().any(|w| m.contains(w));
        if any(&["bike", "cycle", "transport"]) {
            Some(Self::Bike)
        } else if any(&["skill", "work", "technician"]) {
            Some(Self::Tools)
        } else if any(&["city", "location", "place"]) {
            Some(Self::Map)
        } else if any(&["school", "education", "10th"]) {
            Some(Self::Education)
        } else if any(&["salary", "money", "pay"]) {
            Some(Self::Money)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Bike => "BIKE",
            Self::Tools => "TOOLS",
            Self::Map => "MAP",
            Self::Education => "EDU",
            Self::Money => "MONEY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub speaker: Speaker,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::User, text: text.into() }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::Bot, text: text.into() }
    }

    /// `user: ...` / `bot: ...` transcript line.
    pub fn transcript_line(&self) -> String {
        let who = match self.speaker {
            Speaker::User => "user",
            Speaker::Bot => "bot",
        };
        format!("{}: {}", who, self.text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuccessStory {
    pub name: &'static str,
    pub location: &'static str,
    pub before: &'static str,
    pub after: &'static str,
    pub quote: &'static str,
    pub roadmap: &'static str,
    pub salary_increase: &'static str,
}

impl SuccessStory {
    /// Background handed to the model when the user asks this mentor for advice.
    pub fn mentor_background(&self) -> String {
        format!("From {} to {} in {}", self.before, self.after, self.location)
    }
}

pub static SUCCESS_STORIES: [SuccessStory; 5] = [
    SuccessStory {
        name: "Ramesh Kumar",
        location: "Delhi",
        before: "Unemployed",
        after: "Delivery Supervisor",
        quote: "Margdarshak showed me that my driving skills could lead to a management role.",
        roadmap: "Logistics Excellence",
        salary_increase: "2.5x",
    },
    SuccessStory {
        name: "Sunita Devi",
        location: "Mumbai",
        before: "Domestic Helper",
        after: "Retail Store Assistant",
        quote: "I didn't know I could work in a big mall. The roadmap taught me how to talk to customers.",
        roadmap: "Retail Front-end",
        salary_increase: "1.8x",
    },
    SuccessStory {
        name: "Vijay Singh",
        location: "Bengaluru",
        before: "Casual Laborer",
        after: "Certified Electrician",
        quote: "The technical training suggestions changed my life. Now I have a steady monthly salary.",
        roadmap: "Electrical Maintenance",
        salary_increase: "3.0x",
    },
    SuccessStory {
        name: "Anita Verma",
        location: "Pune",
        before: "Unemployed (12th Pass)",
        after: "Customer Support Executive",
        quote: "I thought my English wasn't good enough, but the assistant guided me to the right training.",
        roadmap: "BPO Readiness",
        salary_increase: "2.2x",
    },
    SuccessStory {
        name: "Mohammad Ali",
        location: "Hyderabad",
        before: "Garage Assistant",
        after: "Senior Service Mechanic",
        quote: "I moved from cleaning parts to fixing engines thanks to the clear path shown here.",
        roadmap: "Automotive Advanced",
        salary_increase: "2.0x",
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_profile_with_defaults() {
        let reply = r#"Great, here you go:
```json
{"name": "Sita", "skills": ["Cooking", "Cleaning"], "transport": "Cycle"}
```
All the best!"#;
        let p = extract_profile(reply).unwrap();
        assert_eq!(p.name, "Sita");
        assert_eq!(p.location, "India");
        assert_eq!(p.skills, vec!["Cooking", "Cleaning"]);
        assert_eq!(p.interests, p.skills);
        assert_eq!(p.education, "Not specified");
        assert_eq!(p.experience, "New to workforce");
        assert_eq!(p.preferences.salary, "Competitive");
        assert_eq!(p.preferences.hours, "Full-time");
        assert_eq!(p.preferences.transport, "Cycle");
    }

    #[test]
    fn no_profile_in_plain_or_broken_text() {
        assert_eq!(extract_profile("What city do you live in?"), None);
        assert_eq!(extract_profile("{ not json }"), None);
        assert_eq!(extract_profile("} backwards {"), None);
        assert_eq!(extract_profile("[1, 2]"), None);
    }

    #[test]
    fn non_array_skills_become_empty() {
        let p = UserProfile::from_assistant_json(&json!({"skills": "driving"}));
        assert!(p.skills.is_empty());
    }

    #[test]
    fn job_role_parses_service_json() {
        let role: JobRole = serde_json::from_value(json!({
            "id": "r1",
            "title": "Delivery Partner",
            "description": "Deliver food",
            "averageSalary": "₹18,000",
            "demandLevel": "High",
            "matchScore": 92,
            "icon": "Delivery"
        }))
        .unwrap();
        assert_eq!(role.demand_level, DemandLevel::High);
        assert_eq!(role.match_score, 92.0);
        assert_eq!(role.icon_kind(), RoleIcon::Delivery);
    }

    #[test]
    fn roadmap_status_is_lowercase() {
        let step: RoadmapStep = serde_json::from_value(json!({
            "title": "Get licence", "description": "", "duration": "2 weeks", "status": "current"
        }))
        .unwrap();
        assert_eq!(step.status, StepStatus::Current);
    }

    #[test]
    fn unknown_icon_is_generic() {
        assert_eq!(RoleIcon::from_keyword("Astronaut"), RoleIcon::Generic);
        assert_eq!(RoleIcon::from_keyword(" chef "), RoleIcon::Chef);
    }

    #[test]
    fn visual_cues_follow_keyword_priority() {
        assert_eq!(VisualCue::detect("Do you have a Bike?"), Some(VisualCue::Bike));
        assert_eq!(VisualCue::detect("What work do you know?"), Some(VisualCue::Tools));
        assert_eq!(VisualCue::detect("Which city?"), Some(VisualCue::Map));
        assert_eq!(VisualCue::detect("Did you pass 10th?"), Some(VisualCue::Education));
        assert_eq!(VisualCue::detect("Expected salary?"), Some(VisualCue::Money));
        assert_eq!(VisualCue::detect("Namaste!"), None);
    }

    #[test]
    fn mentor_background_reads_naturally() {
        assert_eq!(
            SUCCESS_STORIES[0].mentor_background(),
            "From Unemployed to Delivery Supervisor in Delhi"
        );
    }
}
