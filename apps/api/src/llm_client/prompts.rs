// Cross-cutting prompt fragments. Feature prompts live next to the feature.

/// Appended to every prompt whose answer is parsed as JSON.
pub const JSON_ONLY_INSTRUCTION: &str = "\
    Return ONLY valid JSON. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";
