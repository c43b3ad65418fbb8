//! Prompt assembly.
//!
//! Every process launch composes its prompt the same way: role prefix, then
//! the initial prompt, then unread mail, then pending handoffs, then (on
//! recovery) the latest checkpoint. Sections empty at assembly time are
//! omitted. Injection never marks mail or handoffs read; the worker's own
//! actions drive that, which keeps delivery at-least-once across crashes.

use crate::domain::models::{Checkpoint, Handoff, MailMessage, WorkerRole};

/// Inputs to one prompt composition.
#[derive(Debug, Default)]
pub struct PromptParts<'a> {
    pub initial_prompt: Option<&'a str>,
    pub mail: &'a [MailMessage],
    pub handoffs: &'a [Handoff],
    pub checkpoint: Option<&'a Checkpoint>,
}

/// Compose the full prompt for a worker process.
pub fn compose(role: WorkerRole, parts: &PromptParts<'_>) -> String {
    let mut sections: Vec<String> = vec![role.system_prefix().to_string()];

    if let Some(prompt) = parts.initial_prompt {
        if !prompt.is_empty() {
            sections.push(prompt.to_string());
        }
    }

    if !parts.mail.is_empty() {
        let mut block = String::from("You have unread mail:\n");
        for message in parts.mail {
            let subject = message
                .subject
                .as_deref()
                .map(|s| format!(" [{s}]"))
                .unwrap_or_default();
            block.push_str(&format!(
                "  - from {}{}: {}\n",
                message.from_handle, subject, message.body
            ));
        }
        sections.push(block.trim_end().to_string());
    }

    if !parts.handoffs.is_empty() {
        let mut block = String::from("Pending handoffs awaiting your acceptance:\n");
        for handoff in parts.handoffs {
            block.push_str(&format!(
                "  - #{} from {}: {}\n",
                handoff.id, handoff.from_handle, handoff.context
            ));
        }
        sections.push(block.trim_end().to_string());
    }

    if let Some(checkpoint) = parts.checkpoint {
        let mut block = String::from("Your last checkpoint, resume from here:\n");
        block.push_str(&checkpoint.body.render());
        sections.push(block.trim_end().to_string());
    }

    sections.join("\n\n")
}
