//! Canned replies and the analytical-vs-chat routing heuristic.

pub const GREETING_REPLY: &str = "Hello! I am your ERP assistant. You can ask me about open orders, items, customers, or pending shipments.";
pub const ACKNOWLEDGE_REPLY: &str = "You're welcome! Let me know if you need anything else.";
pub const GRATITUDE_REPLY: &str = "You're very welcome! Happy to help.";
pub const FAREWELL_REPLY: &str = "Goodbye! Have a great day.";

const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
];
/// Only matched as the entire message; "ok show me orders" is a question.
const ACKNOWLEDGEMENTS: &[&str] = &["ok", "okay", "cool", "great"];
const GRATITUDE: &[&str] = &["thank", "thanks", "thx", "appreciated"];
const FAREWELLS: &[&str] = &["bye", "goodbye", "see you", "cya"];

const BUSINESS_KEYWORDS: &[&str] = &[
    "order", "customer", "item", "pending", "balance", "qty", "sales", "invoice",
];
const CHAT_ONLY: &[&str] = &["help", "what can you do"];

/// Fixed reply for pleasantries, or `None` when the text needs real work.
pub fn static_reply(text: &str) -> Option<&'static str> {
    let t = text.trim().to_lowercase();

    if GREETINGS
        .iter()
        .any(|g| t == *g || t.starts_with(&format!("{g} ")))
    {
        return Some(GREETING_REPLY);
    }
    if ACKNOWLEDGEMENTS.contains(&t.as_str()) {
        return Some(ACKNOWLEDGE_REPLY);
    }
    if GRATITUDE.iter().any(|g| t.contains(g)) {
        return Some(GRATITUDE_REPLY);
    }
    if FAREWELLS.iter().any(|f| t.starts_with(f)) {
        return Some(FAREWELL_REPLY);
    }
    None
}

/// Destination chosen by the smart router for a non-canned message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Analytical,
    Chat,
}

/// Keyword-presence classification of a message.
pub fn classify_message(text: &str) -> MessageKind {
    let t = text.trim().to_lowercase();
    if CHAT_ONLY.contains(&t.as_str()) {
        return MessageKind::Chat;
    }
    if BUSINESS_KEYWORDS.iter().any(|k| t.contains(k)) {
        MessageKind::Analytical
    } else {
        MessageKind::Chat
    }
}
