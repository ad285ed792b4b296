use crate::colleges::CollegeDirectory;
use crate::course::{Course, CourseTables};
use crate::input::{escape_markdown, normalize_district, parse_command, parse_prediction, title_case, Command};
use crate::registry::{now, PredictionRecord, Registry, UserId};
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingDistrict,
    AwaitingPrediction,
}

#[derive(Debug, Clone)]
pub struct Sender {
    pub id: UserId,
    pub first_name: Option<String>,
}

impl Sender {
    pub fn new(id: UserId, first_name: Option<String>) -> Self { Self { id, first_name } }

    fn display_name(&self) -> &str {
        self.first_name.as_deref().filter(|n| !n.trim().is_empty()).unwrap_or("User")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Cutoff,
    Syllabus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Document {
    pub kind: DocumentKind,
    pub course: Course,
}

impl Document {
    pub const ALL: [Document; 4] = [
        Document { kind: DocumentKind::Cutoff, course: Course::Mca },
        Document { kind: DocumentKind::Cutoff, course: Course::Mba },
        Document { kind: DocumentKind::Syllabus, course: Course::Mca },
        Document { kind: DocumentKind::Syllabus, course: Course::Mba },
    ];

    fn kind_name(&self) -> &'static str {
        match self.kind {
            DocumentKind::Cutoff => "cutoff",
            DocumentKind::Syllabus => "syllabus",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}.pdf", self.course.code().to_lowercase(), self.kind_name())
    }

    pub fn display_name(&self) -> String {
        format!("{}_{}.pdf", self.course.code(), title_case(self.kind_name()))
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.file_name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Text { text: String, markdown: bool },
    Document { document: Document },
    Announcements,
    Silent,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self { Reply::Text { text: text.into(), markdown: false } }

    pub fn markdown(text: impl Into<String>) -> Self { Reply::Text { text: text.into(), markdown: true } }
}

pub struct Dialogue {
    states: Mutex<HashMap<UserId, ConversationState>>,
    registry: Registry,
    tables: Arc<CourseTables>,
    colleges: CollegeDirectory,
}

impl Dialogue {
    pub fn new(registry: Registry, tables: Arc<CourseTables>, colleges: CollegeDirectory) -> Self {
        Self { states: Mutex::new(HashMap::new()), registry, tables, colleges }
    }

    pub fn registry(&self) -> &Registry { &self.registry }

    pub fn tables(&self) -> &CourseTables { &self.tables }

    pub fn colleges(&self) -> &CollegeDirectory { &self.colleges }

    pub fn state(&self, user: UserId) -> ConversationState {
        self.states.lock().get(&user).copied().unwrap_or_default()
    }

    fn set_state(&self, user: UserId, state: ConversationState) {
        let mut states = self.states.lock();
        match state {
            ConversationState::Idle => { states.remove(&user); }
            other => { states.insert(user, other); }
        }
    }

    pub fn handle(&self, sender: &Sender, text: &str) -> Result<Reply> {
        match parse_command(text) {
            Some(cmd) => self.handle_command(sender, cmd),
            None => self.handle_text(sender, text),
        }
    }

    pub fn handle_command(&self, sender: &Sender, cmd: Command) -> Result<Reply> {
        tracing::debug!(user_id = sender.id, ?cmd, "command");
        let reply = match cmd {
            Command::Start => {
                self.registry.register_user(sender.id, sender.display_name())?;
                self.set_state(sender.id, ConversationState::Idle);
                Reply::markdown(welcome(&escape_markdown(sender.first_name.as_deref().unwrap_or("there"))))
            }
            Command::Cutoffs => Reply::text(
                "📊 *MCA & MBA PGCET Cutoffs 2024*:\n\n\
                 📄 /mca_cutoff – Download MCA Cutoff PDF\n\
                 📄 /mba_cutoff – Download MBA Cutoff PDF",
            ),
            Command::McaCutoff => document(DocumentKind::Cutoff, Course::Mca),
            Command::MbaCutoff => document(DocumentKind::Cutoff, Course::Mba),
            Command::Syllabus => Reply::text(
                "📘 /mca_syllabus – Download MCA Syllabus\n\
                 📕 /mba_syllabus – Download MBA Syllabus",
            ),
            Command::McaSyllabus => document(DocumentKind::Syllabus, Course::Mca),
            Command::MbaSyllabus => document(DocumentKind::Syllabus, Course::Mba),
            Command::Kea => Reply::Announcements,
            Command::Colleges => {
                self.set_state(sender.id, ConversationState::AwaitingDistrict);
                Reply::markdown("🏙️ Enter your *district name* to see MCA colleges accepting PGCET:")
            }
            Command::Predict => {
                self.set_state(sender.id, ConversationState::AwaitingPrediction);
                Reply::markdown(
                    "✍️ Please enter your details like this:\n\n`Name Course Marks`\n\nExample:\n`Arun MCA 54`",
                )
            }
            Command::Unknown(_) => Reply::text("🤔 Unknown command. Send /start to see what I can do."),
        };
        Ok(reply)
    }

    pub fn handle_text(&self, sender: &Sender, text: &str) -> Result<Reply> {
        match self.state(sender.id) {
            ConversationState::Idle => Ok(Reply::Silent),
            ConversationState::AwaitingPrediction => self.handle_prediction(sender, text),
            ConversationState::AwaitingDistrict => Ok(self.handle_district(sender, text)),
        }
    }

    fn handle_prediction(&self, sender: &Sender, text: &str) -> Result<Reply> {
        let req = match parse_prediction(text) {
            Ok(req) => req,
            // Stay in AwaitingPrediction so the user can retry.
            Err(e) => return Ok(Reply::markdown(e.to_string())),
        };
        let rank = self
            .tables
            .estimate(req.course, req.marks)
            .ok_or_else(|| anyhow!("no rank table loaded for {}", req.course))?;
        self.registry.record_prediction(&PredictionRecord {
            user_id: sender.id,
            display_name: sender.display_name().to_string(),
            input_name: req.name.clone(),
            course: req.course,
            marks: req.marks,
            rank,
            recorded_at: now(),
        })?;
        self.set_state(sender.id, ConversationState::Idle);
        tracing::info!(user_id = sender.id, course = %req.course, marks = req.marks, rank, "predicted rank");
        Ok(Reply::markdown(format!(
            "✅ *Saved!*\n\n👤 Name: {}\n📚 Course: {}\n📝 Marks: {}\n📈 Predicted Rank: *{}*",
            escape_markdown(&req.name),
            req.course,
            req.marks,
            rank
        )))
    }

    fn handle_district(&self, sender: &Sender, text: &str) -> Reply {
        let (district, course) = split_district_course(text);
        self.set_state(sender.id, ConversationState::Idle);
        let shown = escape_markdown(&title_case(&district));
        match self.colleges.lookup(&district, course) {
            Some(colleges) => {
                let mut reply = format!("🏫 *{course} Colleges accepting PGCET* in {shown}:\n\n");
                for college in colleges {
                    reply.push_str(&format!("🔸 {}\n", escape_markdown(college)));
                }
                Reply::markdown(reply)
            }
            None => Reply::markdown(format!(
                "❌ Sorry, no {course} colleges found in '{shown}'. Try another district."
            )),
        }
    }
}

fn split_district_course(text: &str) -> (String, Course) {
    let district = normalize_district(text);
    if let Some((head, last)) = district.rsplit_once(' ') {
        if let Ok(course) = last.parse::<Course>() {
            return (head.to_string(), course);
        }
    }
    (district, Course::Mca)
}

fn document(kind: DocumentKind, course: Course) -> Reply {
    Reply::Document { document: Document { kind, course } }
}

fn welcome(name: &str) -> String {
    format!(
        "👋 Hello {name}, welcome to *PGCET Helper Bot*! 🎓\n\n\
         Use the following commands to access resources:\n\n\
         📊 /cutoffs – View MCA & MBA PGCET 2024 Cutoffs\n\
         📚 /syllabus – Download Syllabus PDFs\n\
         🎓 /colleges – View colleges by district\n\
         📢 /kea – Get recent KEA updates\n\
         📈 /predict – Predict rank by your marks\n"
    )
}
