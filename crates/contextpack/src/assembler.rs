//! Builds `EngineRunRequest.systemPrompt` from five ordered sections
//! (spec §4.7 "Assembler"). Empty sections are omitted; sections are
//! joined by a single blank line, matching the source's concatenation
//! order exactly.

use sa_domain::engine::EngineRunRequest;
use sa_domain::run::{RunConfig, SessionSnapshotData};
use sa_domain::tool::{Message, ToolDefinition};

/// A skill selected for this run, already resolved to its rendered body.
#[derive(Debug, Clone)]
pub struct SelectedSkill {
    pub name: String,
    pub content: String,
}

/// Inputs to [`Assembler::assemble`].
pub struct AssembleRequest {
    pub run_config: RunConfig,
    pub workspace_root: String,
    pub session_id: String,
    pub session_snapshot: Option<SessionSnapshotData>,
    pub skills: Vec<SelectedSkill>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// Stateless system-prompt builder. `base_prompt` is constructor-supplied
/// (spec §4.7 step 1) — typically the output of [`crate::builder::ContextPackBuilder`]
/// over the workspace's AGENTS.md/SOUL.md/etc.
pub struct Assembler {
    base_prompt: String,
}

impl Assembler {
    pub fn new(base_prompt: impl Into<String>) -> Self {
        Self {
            base_prompt: base_prompt.into(),
        }
    }

    pub fn assemble(&self, req: AssembleRequest) -> EngineRunRequest {
        let mut sections: Vec<String> = Vec::new();

        if !self.base_prompt.trim().is_empty() {
            sections.push(self.base_prompt.clone());
        }

        let workspace_section = format!(
            "## Workspace\nRoot: {}\nSession: {}",
            req.workspace_root, req.session_id
        );
        sections.push(workspace_section);

        if let Some(snapshot) = &req.session_snapshot {
            if let Some(section) = render_reflections(snapshot) {
                sections.push(section);
            }
            if let Some(section) = render_observations(snapshot) {
                sections.push(section);
            }
        }

        if let Some(section) = render_skills(&req.skills) {
            sections.push(section);
        }

        let system_prompt = sections.join("\n\n");

        EngineRunRequest {
            run_config: req.run_config,
            system_prompt,
            messages: req.messages,
            tools: req.tools,
        }
    }
}

/// Top five reflections sorted by `frequency` descending (spec §4.7 step 3).
fn render_reflections(snapshot: &SessionSnapshotData) -> Option<String> {
    if snapshot.reflections.is_empty() {
        return None;
    }
    let mut reflections = snapshot.reflections.clone();
    reflections.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    reflections.truncate(5);

    let mut out = String::from("## Long-Term Memory (Reflections)");
    for r in &reflections {
        out.push('\n');
        out.push_str(&format!("- {}: {}", r.topic, r.content));
    }
    Some(out)
}

/// Last ten observations sorted by `ts` descending (spec §4.7 step 4).
fn render_observations(snapshot: &SessionSnapshotData) -> Option<String> {
    if snapshot.observations.is_empty() {
        return None;
    }
    let mut observations = snapshot.observations.clone();
    observations.sort_by(|a, b| b.ts.cmp(&a.ts));
    observations.truncate(10);

    let mut out = String::from("## Recent Observations");
    for o in &observations {
        out.push('\n');
        let kind = match o.kind {
            sa_domain::run::ObservationType::Fact => "fact",
            sa_domain::run::ObservationType::Action => "action",
            sa_domain::run::ObservationType::Outcome => "outcome",
        };
        out.push_str(&format!("- [{}] {}", kind, o.content));
    }
    Some(out)
}

/// Each selected skill wrapped in a `<skill name="...">` block, joined by
/// a blank line (spec §4.7 step 5).
fn render_skills(skills: &[SelectedSkill]) -> Option<String> {
    if skills.is_empty() {
        return None;
    }
    let mut out = String::from("## Active Skills");
    for skill in skills {
        out.push_str("\n\n");
        out.push_str(&format!(
            "<skill name=\"{}\">\n{}\n</skill>",
            skill.name, skill.content
        ));
    }
    Some(out)
}
