//! Encoder MIME type negotiation

/// Encoder configurations, most efficient first. The last entry is assumed
/// to be supported everywhere.
pub const PREFERRED_MIME_TYPES: [&str; 3] = [
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm",
];

/// Video bitrate handed to the encoder (2.5 Mbps)
pub const DEFAULT_VIDEO_BITS_PER_SECOND: u32 = 2_500_000;

/// Pick the first supported entry of [`PREFERRED_MIME_TYPES`].
pub fn negotiate<F>(is_supported: F) -> &'static str
where
    F: Fn(&str) -> bool,
{
    let (guaranteed, preferred) = match PREFERRED_MIME_TYPES.split_last() {
        Some(split) => split,
        None => return "video/webm",
    };

    match preferred.iter().copied().find(|&mime| is_supported(mime)) {
        Some(mime) => mime,
        None => {
            tracing::debug!("No preferred codec supported, using {}", guaranteed);
            *guaranteed
        }
    }
}

/// Container type without codec parameters (`video/webm;codecs=vp9` -> `video/webm`)
pub fn container_type(mime_type: &str) -> &str {
    mime_type
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or(mime_type)
}

/// Codec names listed in the `codecs=` parameter
pub fn codecs(mime_type: &str) -> Vec<&str> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().strip_prefix("codecs="))
        .flat_map(|list| list.trim_matches('"').split(','))
        .map(str::trim)
        .filter(|codec| !codec.is_empty())
        .collect()
}
