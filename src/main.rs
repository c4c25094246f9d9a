mod accounts;
mod audio;
mod config;
mod genai;
mod journey;
mod net_link;
mod protocol;
mod session;
mod types;

use accounts::{Accounts, FileStore};
use config::Config;
use genai::{CareerAdvisor, GeminiClient, SYSTEM_INSTRUCTION, VOICE_SUFFIX};
use journey::{AppStep, JourneyController};
use net_link::{NetCommand, NetLink};
use session::{LiveSession, SessionEvent, SessionReport, SessionUpdate};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use types::SUCCESS_STORIES;
use uuid::Uuid;

type Journey = JourneyController<GeminiClient, FileStore>;

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Start,
    SignUp { email: String, password: String, name: String },
    SignIn { email: String, password: String },
    SignOut,
    Back,
    Home,
    Go(AppStep),
    Demo,
    Role(usize),
    Next,
    Stories,
    Ask { story: usize, question: String },
    Voice,
    Quit,
    Say(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let args: Vec<&str> = rest.split_whitespace().collect();

    let cmd = match word.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "start" => Command::Start,
        "signup" if args.len() >= 3 => Command::SignUp {
            email: args[0].to_string(),
            password: args[1].to_string(),
            name: args[2..].join(" "),
        },
        "login" if args.len() == 2 => Command::SignIn {
            email: args[0].to_string(),
            password: args[1].to_string(),
        },
        "logout" => Command::SignOut,
        "back" => Command::Back,
        "home" => Command::Home,
        "go" => match rest.to_ascii_lowercase().as_str() {
            "chat" => Command::Go(AppStep::Chat),
            "discover" | "discovery" => Command::Go(AppStep::Discovery),
            "roadmap" => Command::Go(AppStep::Roadmap),
            "jobs" => Command::Go(AppStep::Jobs),
            _ => return Some(Command::Say(line.to_string())),
        },
        "demo" => Command::Demo,
        "role" => match rest.parse::<usize>() {
            Ok(n) if n > 0 => Command::Role(n - 1),
            _ => return Some(Command::Say(line.to_string())),
        },
        "next" => Command::Next,
        "stories" => Command::Stories,
        "ask" => {
            let (n, question) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            match n.parse::<usize>() {
                Ok(n) if n > 0 => Command::Ask { story: n - 1, question: question.trim().to_string() },
                _ => return Some(Command::Say(line.to_string())),
            }
        }
        "voice" => Command::Voice,
        "quit" | "exit" => Command::Quit,
        _ => Command::Say(line.to_string()),
    };
    Some(cmd)
}

const HELP: &str = "\
Commands:
  start                          begin counselling (sign in first)
  signup <email> <password> <name>
  login <email> <password>
  logout
  demo                           skip the interview with a sample profile
  role <n>                       pick a suggested role
  next                           see jobs for the roadmap
  go chat|discover|roadmap|jobs
  back | home
  stories                        success stories
  ask <n> <question>             ask a mentor from the stories
  voice                          start/stop talking to the assistant
  quit
Anything else is sent to the assistant while chatting.";

/// Handles of a running live voice session.
struct VoiceSession {
    id: Uuid,
    events_tx: mpsc::Sender<SessionEvent>,
    net_tx: mpsc::Sender<NetCommand>,
    task: JoinHandle<SessionReport>,
    #[cfg(feature = "alsa")]
    _audio: audio::AudioSystem,
}

impl VoiceSession {
    fn start(config: &Config, updates: mpsc::UnboundedSender<SessionUpdate>) -> anyhow::Result<Self> {
        let id = Uuid::new_v4();
        log::info!("Starting live session {}", id);

        // 会话事件队列，所有回调都汇入这里
        let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(256);
        let (net_tx, net_rx) = mpsc::channel::<NetCommand>(100);

        #[cfg(feature = "alsa")]
        let audio = audio::AudioSystem::start(audio::AudioConfig::from(config), events_tx.clone())?;
        #[cfg(feature = "alsa")]
        let output = audio.output();

        #[cfg(not(feature = "alsa"))]
        let output = {
            let timeline = audio::SharedTimeline::new(audio::Timeline::new(
                config.output_sample_rate,
                config.output_channels,
            ));
            tokio::spawn(audio::timeline::run_muted(
                timeline.clone(),
                events_tx.clone(),
                tokio::time::Duration::from_millis(20),
            ));
            timeline
        };

        let instruction = format!("{}{}", SYSTEM_INSTRUCTION, VOICE_SUFFIX);
        let net_link = NetLink::new(config, instruction, events_tx.clone(), net_rx)?;
        tokio::spawn(net_link.run());

        let session = LiveSession::new(output, config.chunk_error_policy, events_rx, net_tx.clone(), updates);
        let task = tokio::spawn(session.run());

        Ok(Self {
            id,
            events_tx,
            net_tx,
            task,
            #[cfg(feature = "alsa")]
            _audio: audio,
        })
    }

    async fn close(&self) {
        if self.events_tx.send(SessionEvent::Closed).await.is_err() {
            log::debug!("Live session {} already finished", self.id);
        }
    }
}

fn render(journey: &Journey) {
    match journey.step() {
        AppStep::Welcome => {
            println!("\n== MARGDARSHAK: Your Future, Guided by AI ==");
            match journey.user() {
                Some(u) if u.profile_created => println!("Welcome back, {}. Type 'start' to continue your journey.", u.name),
                Some(u) => println!("Namaste, {}. Type 'start' for free counselling.", u.name),
                None => println!("Type 'start' for free counselling, or 'stories' for success stories."),
            }
        }
        AppStep::Auth => println!("\n== Sign in ==\nUse 'login <email> <password>' or 'signup <email> <password> <name>'."),
        AppStep::Chat => {
            println!("\n== Chat ==");
            for m in journey.messages() {
                println!("  {}", m.transcript_line());
            }
            if let Some(cue) = journey.visual_cue() {
                println!("  [{}]", cue.label());
            }
        }
        AppStep::Discovery => {
            println!("\n== Roles for you ==");
            for (i, r) in journey.roles().iter().enumerate() {
                println!(
                    "  {}. {} {} ({}% match, {} demand) {}",
                    i + 1,
                    r.icon_kind().symbol(),
                    r.title,
                    r.match_score.round(),
                    format!("{:?}", r.demand_level).to_lowercase(),
                    r.average_salary
                );
                println!("     {}", r.description);
            }
            println!("Type 'role <n>' to see its roadmap.");
        }
        AppStep::Roadmap => {
            let Some(role) = journey.selected_role() else {
                println!("\nPick a role first.");
                return;
            };
            println!("\n== Roadmap: {} ==", role.title);
            for (i, s) in journey.roadmap().iter().enumerate() {
                println!("  {}. [{:?}] {} ({})", i + 1, s.status, s.title, s.duration);
                println!("     {}", s.description);
            }
            println!("Type 'next' to see jobs.");
        }
        AppStep::Jobs => {
            let Some(role) = journey.selected_role() else {
                println!("\nPick a role first.");
                return;
            };
            println!("\n== Jobs: {} ==", role.title);
            for j in journey.jobs() {
                println!("  {} at {}, {} | {} | {}", j.title, j.company, j.location, j.salary, j.posted_at);
                if !j.tags.is_empty() {
                    println!("     {}", j.tags.join(" · "));
                }
            }
        }
        AppStep::Stories => {
            println!("\n== Success stories ==");
            for (i, s) in SUCCESS_STORIES.iter().enumerate() {
                println!("  {}. {} ({}): {} -> {}, {} salary", i + 1, s.name, s.location, s.before, s.after, s.salary_increase);
                println!("     \"{}\" [{}]", s.quote, s.roadmap);
            }
            println!("Type 'ask <n> <question>' to ask a mentor.");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let mut config = Config::new().map_err(anyhow::Error::msg)?;
    config.apply_env_overrides();
    if config.api_key.is_empty() {
        log::warn!("GEMINI_API_KEY is not set, assistant requests will fail");
    }

    let store = FileStore::open(&config.storage_path)?;
    let advisor = CareerAdvisor::new(GeminiClient::new(&config), config.mentor_temperature);
    let mut journey = JourneyController::new(advisor, Accounts::new(store));

    // 会话状态通道
    let (tx_updates, mut rx_updates) = mpsc::unbounded_channel::<SessionUpdate>();
    let mut voice: Option<VoiceSession> = None;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{} {} started. Type 'help' for commands.", config.app_name, config.app_version);
    render(&journey);

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down...");
                break;
            }

            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        log::error!("Failed to read input: {}", e);
                        break;
                    }
                };
                let Some(cmd) = parse_command(&line) else { continue };
                match cmd {
                    Command::Help => {
                        println!("{}", HELP);
                        continue;
                    }
                    Command::Quit => break,
                    Command::Start => journey.start(),
                    Command::SignUp { email, password, name } => {
                        if let Err(e) = journey.sign_up(&name, &email, &password) {
                            println!("{}", e);
                            continue;
                        }
                    }
                    Command::SignIn { email, password } => {
                        if let Err(e) = journey.sign_in(&email, &password) {
                            println!("{}", e);
                            continue;
                        }
                    }
                    Command::SignOut => journey.logout(),
                    Command::Back => journey.go_back(),
                    Command::Home => journey.go_home(),
                    Command::Go(step) => journey.navigate(step),
                    Command::Demo => {
                        if journey.step() != AppStep::Chat {
                            println!("The demo profile is available while chatting. Type 'start' first.");
                            continue;
                        }
                        println!("Thinking for you...");
                        journey.use_demo_profile().await;
                    }
                    Command::Role(n) => {
                        println!("Thinking for you...");
                        if !journey.select_role(n).await {
                            println!("No such role.");
                        }
                    }
                    Command::Next => {
                        println!("Thinking for you...");
                        journey.continue_to_jobs().await;
                    }
                    Command::Stories => journey.open_stories(),
                    Command::Ask { story, question } => {
                        match journey.ask_mentor(story, &question).await {
                            Some(advice) => println!("{}: {}", SUCCESS_STORIES[story].name, advice),
                            None => println!("Usage: ask <n> <question>"),
                        }
                        continue;
                    }
                    Command::Voice => {
                        if let Some(v) = &voice {
                            v.close().await;
                            continue;
                        }
                        if journey.step() != AppStep::Chat {
                            println!("Voice is available while chatting. Type 'start' first.");
                            continue;
                        }
                        match VoiceSession::start(&config, tx_updates.clone()) {
                            Ok(v) => {
                                println!("Connecting... type 'voice' again to stop.");
                                voice = Some(v);
                            }
                            Err(e) => log::error!("Failed to start live session: {:#}", e),
                        }
                        continue;
                    }
                    Command::Say(text) => {
                        if journey.step() != AppStep::Chat {
                            println!("Unknown command. Type 'help'.");
                            continue;
                        }
                        if let Some(v) = &voice {
                            // 语音会话中，文字直接进入实时对话
                            if let Err(e) = v.net_tx.send(NetCommand::SendText(text)).await {
                                log::warn!("Failed to send text to NetLink: {}", e);
                            }
                            continue;
                        }
                        journey.send_chat(&text).await;
                    }
                }
                render(&journey);
            }

            Some(update) = rx_updates.recv() => {
                match update {
                    SessionUpdate::Active => println!("Live session active. Speak now."),
                    SessionUpdate::Transcript(text) => log::debug!("Transcript so far: {}", text),
                    SessionUpdate::BotMessage(text) => {
                        println!("  bot: {}", text);
                        journey.push_bot_message(text);
                        if let Some(cue) = journey.visual_cue() {
                            println!("  [{}]", cue.label());
                        }
                    }
                    SessionUpdate::Interrupted { stopped } => {
                        log::info!("Speech interrupted, {} source(s) stopped", stopped);
                    }
                    SessionUpdate::ChunkDropped { reason, total } => {
                        println!("Audio chunk dropped ({}), {} so far", reason, total);
                    }
                    SessionUpdate::Reconnecting => println!("Connection lost, reconnecting..."),
                    SessionUpdate::Ended(report) => {
                        if let Some(v) = voice.take() {
                            log::info!(
                                "Live session {} finished: {} turn(s), {} frame(s) sent, {} discarded",
                                v.id,
                                report.turns,
                                report.frames_sent,
                                report.frames_discarded
                            );
                        }
                        println!("Voice session ended.");
                    }
                }
            }
        }
    }

    if let Some(v) = voice.take() {
        v.close().await;
        if let Err(e) = v.task.await {
            log::warn!("Live session task failed: {}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("   "), None);
        assert_eq!(parse_command("role 2"), Some(Command::Role(1)));
        assert_eq!(parse_command("GO jobs"), Some(Command::Go(AppStep::Jobs)));
        assert_eq!(
            parse_command("signup a@b.c pw Ravi Kumar"),
            Some(Command::SignUp { email: "a@b.c".into(), password: "pw".into(), name: "Ravi Kumar".into() })
        );
        assert_eq!(
            parse_command("ask 3 how do I start?"),
            Some(Command::Ask { story: 2, question: "how do I start?".into() })
        );
    }

    #[test]
    fn malformed_commands_become_chat_text() {
        assert_eq!(parse_command("role zero"), Some(Command::Say("role zero".into())));
        assert_eq!(parse_command("role 0"), Some(Command::Say("role 0".into())));
        assert_eq!(parse_command("I know driving"), Some(Command::Say("I know driving".into())));
        assert_eq!(parse_command("login only-email"), Some(Command::Say("login only-email".into())));
    }
}
