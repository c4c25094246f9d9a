//! Requests to the generative text service and parsing of its replies.
//!
//! The suggestion logic itself lives in the remote model. This module only shapes
//! the prompts and JSON schemas and turns the replies into domain types.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::Config;
use crate::protocol::Content;
use crate::types::{ChatMessage, JobListing, JobRole, RoadmapStep, RoleIcon, UserProfile, extract_profile};

pub const SYSTEM_INSTRUCTION: &str = r#"You are "Margdarshak", a friendly and patient AI job assistant for blue and grey-collar workers in India.
Your goal is to build a profile for the user through simple conversation.
Use simple Hindi or English (Hinglish).
Ask about:
1. Name
2. Location
3. Skills (e.g., driving, cooking, cleaning, repairs)
4. Past work experience
5. If they have a vehicle (bike/car)
6. Education (10th, 12th, etc.)

Keep your responses short and encouraging.
If the user sounds confused, give examples (e.g., "Do you like working outdoors or in a store?").
Once you have enough info, summarize what you've learned.
If you are asked to provide JSON, provide a JSON block representing the user's profile with fields: name, location, skills (array), education, experience, transport, salaryPreference."#;

/// Extra instruction for the spoken assistant.
pub const VOICE_SUFFIX: &str = "\nAlways use very simple words. Speak slowly.";
/// Extra instruction for the typed chat.
pub const CHAT_SUFFIX: &str = "\nOutput final profile as JSON only when user says they are done.";

const MENTOR_FALLBACK: &str = "Keep working hard, you can do it!";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerateRequest {
    pub contents: String,
    pub system_instruction: Option<String>,
    /// When set the reply must be JSON matching this schema
    pub response_schema: Option<Value>,
    pub temperature: Option<f32>,
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Raw text of the model's reply.
    async fn generate(&self, request: GenerateRequest) -> Result<String>;
}

// ======================== REST client ========================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

impl From<GenerateRequest> for GenerateContentBody {
    fn from(req: GenerateRequest) -> Self {
        Self {
            contents: vec![Content::text(Some("user"), req.contents)],
            system_instruction: req.system_instruction.map(|s| Content::text(None, s)),
            generation_config: GenerationConfig {
                response_mime_type: req.response_schema.as_ref().map(|_| "application/json"),
                response_schema: req.response_schema,
                temperature: req.temperature,
            },
        }
    }
}

/// Concatenated text parts of the first candidate.
fn candidate_text(response: &Value) -> String {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)).collect())
        .unwrap_or_default()
}

pub struct GeminiClient {
    client: Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_base: config.genai_api_base.trim_end_matches('/').to_string(),
            model: config.text_model.to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let body = GenerateContentBody::from(request);
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("generateContent request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            bail!("generateContent HTTP {}: {}", status, detail);
        }
        let json: Value = resp.json().await.context("generateContent returned invalid JSON")?;
        Ok(candidate_text(&json))
    }
}

// ======================== Career requests ========================

#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    Message(String),
    ProfileComplete(UserProfile),
}

fn string_type() -> Value {
    json!({ "type": "STRING" })
}

fn array_of(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "ARRAY",
        "items": { "type": "OBJECT", "properties": properties, "required": required }
    })
}

fn role_schema() -> Value {
    let icon_hint = format!("Suggest a keyword like {}", RoleIcon::KEYWORDS.map(|k| format!("'{}'", k)).join(", "));
    array_of(
        json!({
            "id": string_type(),
            "title": string_type(),
            "description": string_type(),
            "averageSalary": string_type(),
            "demandLevel": { "type": "STRING", "enum": ["High", "Medium", "Low"] },
            "matchScore": { "type": "NUMBER" },
            "icon": { "type": "STRING", "description": icon_hint }
        }),
        &["id", "title", "description", "averageSalary", "demandLevel", "matchScore", "icon"],
    )
}

fn roadmap_schema() -> Value {
    array_of(
        json!({
            "title": string_type(),
            "description": string_type(),
            "duration": string_type(),
            "status": { "type": "STRING", "enum": ["pending", "completed", "current"] }
        }),
        &["title", "description", "duration", "status"],
    )
}

fn listing_schema() -> Value {
    array_of(
        json!({
            "id": string_type(),
            "title": string_type(),
            "company": string_type(),
            "location": string_type(),
            "salary": string_type(),
            "tags": { "type": "ARRAY", "items": string_type() },
            "postedAt": string_type()
        }),
        &["id", "title", "company", "location", "salary", "tags", "postedAt"],
    )
}

/// Empty replies count as an empty list.
fn parse_list<T: DeserializeOwned>(text: &str, what: &str) -> Result<Vec<T>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text).with_context(|| format!("reply is not a valid {} list", what))
}

pub struct CareerAdvisor<M: GenerativeModel> {
    model: M,
    mentor_temperature: f32,
}

impl<M: GenerativeModel> CareerAdvisor<M> {
    pub fn new(model: M, mentor_temperature: f32) -> Self {
        Self { model, mentor_temperature }
    }

    pub async fn discover_roles(&self, profile: &UserProfile) -> Result<Vec<JobRole>> {
        let contents = format!(
            "Based on this user profile: {}, suggest 4 suitable blue/grey-collar job roles in India. \nReturn the response in JSON format.",
            serde_json::to_string(profile)?
        );
        let reply = self
            .model
            .generate(GenerateRequest { contents, response_schema: Some(role_schema()), ..Default::default() })
            .await?;
        parse_list(&reply, "role")
    }

    pub async fn roadmap(&self, role: &JobRole, profile: &UserProfile) -> Result<Vec<RoadmapStep>> {
        let contents = format!(
            "Create a 4-step learning roadmap for the role \"{}\" given a candidate with these skills: {}. Focus on practical, blue-collar readiness in India.",
            role.title,
            profile.skills.join(", ")
        );
        let reply = self
            .model
            .generate(GenerateRequest { contents, response_schema: Some(roadmap_schema()), ..Default::default() })
            .await?;
        parse_list(&reply, "roadmap step")
    }

    pub async fn recommended_jobs(&self, role: &JobRole, profile: &UserProfile) -> Result<Vec<JobListing>> {
        let contents = format!(
            "Generate 5 realistic mock job listings in {} for the role \"{}\". Include company names like \"Zomato\", \"Urban Company\", \"Reliance Retail\", etc.",
            profile.location, role.title
        );
        let reply = self
            .model
            .generate(GenerateRequest { contents, response_schema: Some(listing_schema()), ..Default::default() })
            .await?;
        parse_list(&reply, "job listing")
    }

    pub async fn mentor_advice(&self, mentor_name: &str, mentor_story: &str, question: &str) -> Result<String> {
        let contents = format!(
            "You are {}. Your background is: {}. \nA job seeker asks you: \"{}\". \nGive them short, practical, and encouraging advice in simple Hinglish (Hindi + English). \nLimit to 2-3 sentences.",
            mentor_name, mentor_story, question
        );
        let reply = self
            .model
            .generate(GenerateRequest {
                contents,
                temperature: Some(self.mentor_temperature),
                ..Default::default()
            })
            .await?;
        let reply = reply.trim();
        Ok(if reply.is_empty() { MENTOR_FALLBACK.to_string() } else { reply.to_string() })
    }

    /// One typed chat turn. The whole history goes along, one `speaker: text` line each.
    pub async fn chat_turn(&self, history: &[ChatMessage], user_message: &str) -> Result<ChatReply> {
        let mut lines: Vec<String> = history.iter().map(ChatMessage::transcript_line).collect();
        lines.push(ChatMessage::user(user_message).transcript_line());

        let reply = self
            .model
            .generate(GenerateRequest {
                contents: lines.join("\n"),
                system_instruction: Some(format!("{}{}", SYSTEM_INSTRUCTION, CHAT_SUFFIX)),
                ..Default::default()
            })
            .await?;

        Ok(match extract_profile(&reply) {
            Some(profile) => ChatReply::ProfileComplete(profile),
            None => ChatReply::Message(reply),
        })
    }
}
