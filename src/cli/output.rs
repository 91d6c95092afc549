//! Colored terminal output for the CLI

use owo_colors::OwoColorize;

use crate::research::Session;
use crate::types::{AnalyzeResponse, RoundPayload, SessionHistory, SessionStatus, SessionSummary};
use crate::utils::truncate_chars;

const PREVIEW_CHARS: usize = 400;

pub struct Output {
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self { colored: true }
    }

    pub fn no_color() -> Self {
        Self { colored: false }
    }

    pub fn banner(&self) {
        let art = [
            " ____        _             _   ",
            "/ ___|  ___ | | ___ __ __ _| |_ ",
            "\\___ \\ / _ \\| |/ / '__/ _` | __|",
            " ___) | (_) |   <| | | (_| | |_ ",
            "|____/ \\___/|_|\\_\\_|  \\__,_|\\__|",
        ];
        println!();
        for line in art {
            if self.colored {
                println!("   {}", line.bright_cyan().bold());
            } else {
                println!("   {}", line);
            }
        }
        let tagline = format!("Research server v{}", env!("CARGO_PKG_VERSION"));
        if self.colored {
            println!("   {}\n", tagline.dimmed());
        } else {
            println!("   {}\n", tagline);
        }
    }

    pub fn success(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "✓".green().bold(), message.green());
        } else {
            println!("  [OK] {}", message);
        }
    }

    pub fn info(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "•".blue(), message);
        } else {
            println!("  [INFO] {}", message);
        }
    }

    pub fn warning(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            println!("  [WARN] {}", message);
        }
    }

    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    pub fn subheader(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.cyan().bold());
        } else {
            println!("\n  --- {} ---", title);
        }
    }

    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    pub fn list_item(&self, item: &str) {
        if self.colored {
            println!("    {} {}", "•".blue(), item);
        } else {
            println!("    - {}", item);
        }
    }

    /// Indented multi-line text, cut to a preview
    pub fn block(&self, text: &str) {
        let preview = truncate_chars(text, PREVIEW_CHARS);
        for line in preview.lines() {
            println!("      {}", line);
        }
        if preview.len() < text.len() {
            println!("      ...");
        }
    }

    pub fn table_header(&self, columns: &[&str]) {
        let header = columns
            .iter()
            .map(|c| format!("{:<15}", c))
            .collect::<Vec<_>>()
            .join(" ");
        if self.colored {
            println!("    {}", header.bright_white().bold());
            println!("    {}", "─".repeat(columns.len() * 16).dimmed());
        } else {
            println!("    {}", header);
            println!("    {}", "-".repeat(columns.len() * 16));
        }
    }

    pub fn table_row(&self, values: &[&str]) {
        let row = values
            .iter()
            .map(|v| format!("{:<15}", v))
            .collect::<Vec<_>>()
            .join(" ");
        println!("    {}", row);
    }

    pub fn analysis(&self, response: &AnalyzeResponse) {
        self.header("Analysis");
        self.kv("query id", &response.query_id);

        self.subheader("Sources");
        if response.sources.is_empty() {
            self.list_item("none");
        }
        for source in &response.sources {
            self.list_item(&format!("{} ({})", source.title, source.url));
        }

        for (model, text) in &response.model_analyses {
            self.subheader(model);
            self.block(text);
        }

        if response.confidence_flags.is_empty() {
            self.success("No confidence flags");
        } else {
            self.subheader("Confidence flags");
            for flag in &response.confidence_flags {
                self.warning(flag);
            }
        }
    }

    pub fn session(&self, session: &Session) {
        self.header("Research session");
        self.kv("id", &session.id);
        self.kv("task", &session.task);
        self.kv("state", &format!("{:?}", session.state));
        self.kv(
            "rounds",
            &format!("{}/{}", session.current_round + 1, session.max_rounds),
        );
        self.kv("quality", &format!("{:.1}", session.quality_score));
        let trend = session
            .improvement_trend
            .iter()
            .map(|s| format!("{:.1}", s))
            .collect::<Vec<_>>()
            .join(" → ");
        self.kv("trend", &trend);

        self.subheader("Expertise");
        for result in &session.expertise_results {
            self.list_item(&format!(
                "{} {:.1}: {}",
                result.expert_type,
                result.score,
                result.findings.join("; ")
            ));
        }

        if let Some(synthesis) = &session.final_synthesis {
            self.subheader("Final synthesis");
            self.block(synthesis);
        }
        if let Some(error) = &session.error {
            self.error(error);
        }
    }

    pub fn sessions(&self, sessions: &[SessionSummary]) {
        if sessions.is_empty() {
            self.info("No sessions recorded");
            return;
        }
        self.table_header(&["Status", "Created", "Id", "Task"]);
        for summary in sessions {
            let status = match summary.status {
                SessionStatus::Active => "active",
                SessionStatus::Finished => "finished",
            };
            let created = summary.created_at.format("%Y-%m-%d %H:%M").to_string();
            self.table_row(&[
                status,
                created.as_str(),
                summary.id.as_str(),
                truncate_chars(&summary.task, 60),
            ]);
        }
    }

    pub fn history(&self, history: &SessionHistory) {
        if let Some(session) = &history.session {
            self.header(&format!("Session {}", session.id));
            self.kv("task", &session.task);
            self.kv("created", &session.created_at.to_rfc3339());
            self.kv("max rounds", &session.config.max_rounds.to_string());
        }

        for round in &history.rounds {
            self.subheader(&format!("Round {} / {}", round.round_number + 1, round.payload.kind()));
            match &round.payload {
                RoundPayload::Primary { model, content, tokens } => {
                    self.kv("model", model);
                    self.kv("tokens", &tokens.to_string());
                    self.block(content);
                }
                RoundPayload::Discussion { responses, .. } => {
                    for (model, reply) in responses {
                        self.list_item(&format!("{}: {}", model, truncate_chars(reply, 120)));
                    }
                }
                RoundPayload::Final {
                    synthesis,
                    quality_score,
                    reason,
                } => {
                    self.kv("score", &format!("{:.1}", quality_score));
                    self.kv("reason", reason);
                    self.block(synthesis);
                }
                RoundPayload::Failed { error } => self.error(error),
            }
        }

        if !history.expertise.is_empty() {
            self.subheader("Expertise");
            for stored in &history.expertise {
                self.list_item(&format!(
                    "round {} {} {:.1}",
                    stored.round_number + 1,
                    stored.result.expert_type,
                    stored.result.score
                ));
            }
        }
    }
}
