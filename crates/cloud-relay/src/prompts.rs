//! Fixed prompt text for the answer generator.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever the system instruction
//! changes so logged answers can be traced back to the wording that produced them.

/// Prompt version. Bump on any system instruction change.
pub const PROMPT_VERSION: &str = "1.0.0";

/// System instruction sent with every request.
///
/// The remote project renders `nw` as a line break (the codec turns it into
/// the `00` token), so the model is told to use it instead of real newlines,
/// which the alphabet cannot carry.
pub const SYSTEM_PROMPT: &str = "\
You are a chatbot. Respond simply, briefly, and child-friendly. \
Use 'nw' for new lines. Use nw to start a new line about every 80 letters; \
if the answer fits on one line, do not add it. \
Answer nicely and do not spam letters. Here is the user request: ";

/// Returned instead of an answer whenever the text model call fails.
pub const FALLBACK_RESPONSE: &str =
    "Sorry, I couldn't generate a response.nwTry asking something simple. nw(server error)";
