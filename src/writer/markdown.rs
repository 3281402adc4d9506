//! Markdown projection (spec §4.5/§6): fixed section order, each section
//! omitted if its source list is empty, CommonMark subset only (ATX
//! headers, fenced code, inline code, unordered lists, paragraphs).

use std::fmt::Write as _;

use crate::model::{Analysis, AnalysisEntry, Conversation, WorkingState};

/// Renders `analysis` as the markdown projection (spec §4.5 fixed section
/// order: Overview, User Intents, AI Actions, Technical Work, Decisions,
/// Flow, Working State). One-way: there is no markdown parser, since this
/// format exists for humans, not round-trips.
///
/// `conversation` supplies the Overview section's span/count/source-mix
/// data. It's `None` when re-rendering from an AICF document alone (the
/// aging service's archive-compression pass, spec §4.6), which doesn't
/// carry that data — the Overview section is then omitted, since there's
/// nothing to report beyond the heading already present.
pub fn render(analysis: &Analysis, conversation: Option<&Conversation>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# {}", analysis.conversation_id);
    out.push('\n');

    if let Some(conversation) = conversation {
        render_overview(&mut out, conversation);
    }

    render_section(&mut out, "User Intents", &analysis.user_intents);
    render_section(&mut out, "AI Actions", &analysis.ai_actions);
    render_section(&mut out, "Technical Work", &analysis.technical_work);
    render_section(&mut out, "Decisions", &analysis.decisions);
    render_section(&mut out, "Flow", &analysis.flow_events);
    render_working_state(&mut out, &analysis.working_state);

    while out.ends_with("\n\n") {
        out.pop();
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn render_overview(out: &mut String, conversation: &Conversation) {
    let _ = writeln!(out, "## Overview\n");
    let counts = conversation.counts();
    let _ = writeln!(
        out,
        "- **Messages:** {} ({} user, {} assistant)",
        counts.total, counts.user, counts.assistant
    );
    if let Some((start, end)) = conversation.span() {
        let _ = writeln!(out, "- **Span:** {} to {}", start.to_rfc3339(), end.to_rfc3339());
    }
    let sources = conversation
        .source_mix()
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if !sources.is_empty() {
        let _ = writeln!(out, "- **Sources:** {sources}");
    }
    out.push('\n');
}

fn render_section(out: &mut String, title: &str, entries: &[AnalysisEntry]) {
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "## {title}\n");
    for entry in entries {
        render_entry(out, entry);
    }
    out.push('\n');
}

fn render_entry(out: &mut String, entry: &AnalysisEntry) {
    if looks_like_code(&entry.text) {
        let _ = writeln!(out, "- ```\n  {}\n  ```", entry.text.replace('\n', "\n  "));
    } else {
        let _ = writeln!(out, "- {} _{}_", entry.text, entry.priority);
    }
}

fn render_working_state(out: &mut String, state: &WorkingState) {
    let has_content = state.working_on.is_some()
        || !state.blockers.is_empty()
        || state.next_action.is_some()
        || state.progress.is_some();
    if !has_content {
        return;
    }

    let _ = writeln!(out, "## Working State\n");
    if let Some(working_on) = &state.working_on {
        let _ = writeln!(out, "- **Working on:** {working_on}");
    }
    if !state.blockers.is_empty() {
        let _ = writeln!(out, "- **Blockers:**");
        for blocker in &state.blockers {
            let _ = writeln!(out, "  - {blocker}");
        }
    }
    if let Some(next_action) = &state.next_action {
        let _ = writeln!(out, "- **Next action:** {next_action}");
    }
    if let Some(progress) = state.progress {
        let _ = writeln!(out, "- **Progress:** {:.0}%", progress * 100.0);
    }
    out.push('\n');
}

/// Entries mentioning file paths or shell prompts read better as fenced
/// blocks than as prose bullets.
fn looks_like_code(text: &str) -> bool {
    text.contains("```") || text.trim_start().starts_with('$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, Priority, Role, SourceTag};
    use std::collections::BTreeMap;

    fn entry(text: &str, priority: Priority) -> AnalysisEntry {
        AnalysisEntry {
            timestamp: "2025-10-22T09:42:23Z".parse().unwrap(),
            text: text.to_string(),
            priority,
            metadata: BTreeMap::new(),
        }
    }

    fn empty_analysis() -> Analysis {
        Analysis {
            conversation_id: "S1".to_string(),
            user_intents: Vec::new(),
            ai_actions: Vec::new(),
            technical_work: Vec::new(),
            decisions: Vec::new(),
            flow_events: Vec::new(),
            working_state: WorkingState::default(),
        }
    }

    #[test]
    fn render_omits_empty_sections() {
        let out = render(&empty_analysis(), None);
        assert!(!out.contains("## User Intents"));
        assert!(!out.contains("## Working State"));
    }

    #[test]
    fn render_includes_nonempty_sections_in_fixed_order() {
        let mut analysis = empty_analysis();
        analysis.user_intents = vec![entry("Fix the bug", Priority::Medium)];
        analysis.decisions = vec![entry("Use SQLite", Priority::Critical)];
        let out = render(&analysis, None);
        let intents_pos = out.find("## User Intents").unwrap();
        let decisions_pos = out.find("## Decisions").unwrap();
        assert!(intents_pos < decisions_pos);
        assert!(!out.contains("## AI Actions"));
    }

    #[test]
    fn render_ends_with_single_trailing_newline() {
        let out = render(&empty_analysis(), None);
        assert!(out.ends_with('\n'));
        assert!(!out.ends_with("\n\n"));
    }

    #[test]
    fn render_includes_working_state_when_present() {
        let mut analysis = empty_analysis();
        analysis.working_state = WorkingState {
            working_on: Some("the login bug".to_string()),
            blockers: vec!["waiting on review".to_string()],
            next_action: Some("merge the PR".to_string()),
            progress: Some(0.5),
        };
        let out = render(&analysis, None);
        assert!(out.contains("## Working State"));
        assert!(out.contains("Working on:"));
        assert!(out.contains("50%"));
    }

    #[test]
    fn render_has_no_html() {
        let mut analysis = empty_analysis();
        analysis.user_intents = vec![entry("check <script>", Priority::Low)];
        let out = render(&analysis, None);
        assert!(!out.contains("<div"));
    }

    #[test]
    fn render_includes_overview_when_conversation_supplied() {
        let now = "2025-10-22T09:42:23Z".parse().unwrap();
        let m1 = Message::new(
            "a".into(),
            "S1".into(),
            now,
            Role::User,
            "hi".into(),
            SourceTag::KvStore,
            "test",
            BTreeMap::new(),
            now,
        )
        .unwrap();
        let conversation = Conversation::new("S1".to_string(), vec![m1]);
        let out = render(&empty_analysis(), Some(&conversation));
        assert!(out.contains("## Overview"));
        assert!(out.contains("1 user, 0 assistant"));
        assert!(out.contains("kv-store"));
    }

    #[test]
    fn render_omits_overview_when_no_conversation_supplied() {
        let out = render(&empty_analysis(), None);
        assert!(!out.contains("## Overview"));
    }
}
