/// Display name for a normalized language code, used in prompt rendering.
///
/// Unknown codes pass through unchanged so a prompt never renders empty.
pub fn display_name(code: &str) -> String {
    let normalized = code.trim().to_ascii_lowercase();
    let known = match normalized.as_str() {
        "en" => "English",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "sv" => "Swedish",
        "tr" => "Turkish",
        "ru" => "Russian",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" | "zh-hans" => "Simplified Chinese",
        "zh-hant" => "Traditional Chinese",
        _ => return code.trim().to_string(),
    };
    known.to_string()
}
