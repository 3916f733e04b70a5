//! Built-in recipes seeded on startup when the configuration asks for them.

use crate::core::recipe::{Recipe, RecipeStep};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// --- Recipe: Meeting Scheduler ---

fn meeting_scheduler() -> Recipe {
    Recipe {
        name: "Meeting Scheduler".to_string(),
        intent: "schedule_meeting".to_string(),
        description: "Schedule a meeting with participants".to_string(),
        steps: vec![
            RecipeStep::api_call(
                "check_availability",
                &[("time", "{time}"), ("participants", "{participants}")],
            ),
            RecipeStep::api_call(
                "create_meeting",
                &[("time", "{time}"), ("participants", "{participants}")],
            ),
            RecipeStep::notification("Meeting invites sent to {participants} for {time}"),
        ],
        required_entities: strings(&["time", "participants"]),
        keywords: strings(&["schedule", "meeting", "calendar", "invite"]),
        common_triggers: strings(&["schedule a meeting", "set up a meeting", "book a call"]),
        success_criteria: strings(&["Meeting scheduled", "Invites sent"]),
    }
}

// --- Recipe: Research Report ---

fn research_report() -> Recipe {
    Recipe {
        name: "Research Report".to_string(),
        intent: "research".to_string(),
        description: "Research a topic and create a detailed report".to_string(),
        steps: vec![
            RecipeStep::database_query("search_info", &[("topic", "{topic}")]),
            RecipeStep::database_query("analyze_results", &[("depth", "detailed")]),
            RecipeStep::notification("Research report on {topic} is ready"),
        ],
        required_entities: strings(&["topic"]),
        keywords: strings(&["research", "analyze", "report", "investigate"]),
        common_triggers: strings(&["research about", "analyze topic"]),
        success_criteria: strings(&["Research completed", "Report created"]),
    }
}

// --- Recipe: Document Management ---

fn document_management() -> Recipe {
    Recipe {
        name: "Document Management".to_string(),
        intent: "document".to_string(),
        description: "Create and manage documents".to_string(),
        steps: vec![
            RecipeStep::database_query("create_document", &[("type", "{doc_type}")]),
            RecipeStep::notification("Document of type {doc_type} created"),
        ],
        required_entities: strings(&["doc_type"]),
        keywords: strings(&["document", "create", "write", "record"]),
        common_triggers: strings(&["create a document", "write documentation"]),
        success_criteria: strings(&["Document created", "Content added"]),
    }
}

// --- Recipe: Email Sender ---

fn email_sender() -> Recipe {
    Recipe {
        name: "Email Sender".to_string(),
        intent: "email_send".to_string(),
        description: "Compose and send an email to a recipient".to_string(),
        steps: vec![RecipeStep::api_call(
            "send_email",
            &[("to", "{recipient}"), ("subject", "{subject}")],
        )],
        required_entities: strings(&["recipient", "subject"]),
        keywords: strings(&["email", "send", "mail", "message"]),
        common_triggers: strings(&["send an email", "email someone"]),
        success_criteria: strings(&["Email sent"]),
    }
}

pub fn default_recipes() -> Vec<Recipe> {
    vec![
        meeting_scheduler(),
        research_report(),
        document_management(),
        email_sender(),
    ]
}
