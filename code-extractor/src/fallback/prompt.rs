//! Prompt construction for the model-backed extraction.

/// Marker appended when the source does not fit the prompt budget.
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

pub const SYSTEM_PROMPT: &str = "You are an expert static code analyzer. \
Answer with a single JSON object and nothing else: no prose, no Markdown fences.";

/// User prompt embedding the language hint, the expected schema and the
/// (possibly truncated) source text.
pub fn build_prompt(language_hint: &str, code: &str, max_chars: usize) -> String {
    let hint = if language_hint.trim().is_empty() {
        "unknown"
    } else {
        language_hint.trim()
    };
    let body = truncate_chars(code, max_chars);
    format!(
        "Extract the structure of the following {hint} source file.\n\
         Return ONLY a valid JSON object with this schema:\n\
         {{\n\
         \x20 \"classes\": [{{\"name\": \"\", \"kind\": \"class\", \"extends\": [], \"methods\": []}}],\n\
         \x20 \"functions\": [{{\"name\": \"\", \"params\": [], \"returnType\": null}}],\n\
         \x20 \"imports\": [\"\"],\n\
         \x20 \"api_endpoints\": [{{\"method\": \"GET\", \"path\": \"/\", \"handler\": \"\"}}],\n\
         \x20 \"summary\": \"\"\n\
         }}\n\
         Use empty lists when nothing is found.\n\n\
         Code:\n{body}\n"
    )
}

/// `code` cut to at most `max_chars` characters (on a char boundary), with
/// [`TRUNCATION_MARKER`] when anything was dropped.
pub fn truncate_chars(code: &str, max_chars: usize) -> String {
    match code.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &code[..cut]),
        None => code.to_string(),
    }
}
