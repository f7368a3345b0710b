// Shared prompt fragments.
// Each pipeline stage that calls the LLM defines its own prompts alongside it
// (see generation::prompts). This file holds the cross-cutting pieces.

/// Value substituted for any profile field the club did not provide.
/// Prompts always list every field so their structure never shifts.
pub const NOT_PROVIDED: &str = "Not provided";

/// System prompt for every authoring call.
pub const DOCUMENT_CREATOR_SYSTEM: &str = "You are a professional document creator for clubs and organizations.";

/// Appended to authoring prompts so the output stays extractable.
pub const MARKUP_ONLY_INSTRUCTION: &str = "\
    Format your response as complete HTML documents with embedded CSS. \
    Do not include any additional text or explanations outside the HTML structure.";

/// Appended to authoring prompts to keep content honest.
pub const FACTS_ONLY_INSTRUCTION: &str = "\
    Only use the information given to you. Do not invent events, dates, \
    contact details or achievements that are not in the club information.";
