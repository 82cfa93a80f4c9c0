// Filter graph builder: scale / frame-dedupe / fps / palette chains

/// Build a scale filter from a resolution spec.
///
/// - empty or "1": no scaling.
/// - a positive number N: divide each dimension by N, rounded down to the
///   nearest even integer (codecs want even dimensions).
/// - "WxH" or "W:H": explicit size, passed through with `:` as separator.
/// - anything else: no filter. Unrecognized specs are tolerated rather than
///   rejected so a stray token degrades to "keep original size".
pub fn scale_filter(spec: &str) -> Option<String> {
    let spec = spec.trim();
    if spec.is_empty() || spec == "1" {
        return None;
    }
    if let Ok(div) = spec.parse::<f64>() {
        if div > 0.0 {
            return Some(format!(
                "scale=trunc((iw/{div})/2)*2:trunc((ih/{div})/2)*2"
            ));
        }
        return None;
    }
    if spec.contains('x') || spec.contains(':') {
        return Some(format!("scale={}", spec.replace('x', ":")));
    }
    None
}

/// Filter chain for motion formats: optional scale, always mpdecimate to
/// drop duplicate frames, optional fps cap. Joined with commas.
pub fn motion_chain(resolution: &str, fps: &str) -> String {
    let mut filters = Vec::new();
    if let Some(scale) = scale_filter(resolution) {
        filters.push(scale);
    }
    filters.push("mpdecimate".to_string());
    if !fps.is_empty() {
        filters.push(format!("fps={fps}"));
    }
    filters.join(",")
}

/// Filter chains for palette-based output: one feeding palettegen, one
/// consuming the generated palette through a two-input graph.
pub fn palette_chains(resolution: &str, fps: &str) -> (String, String) {
    let chain = motion_chain(resolution, fps);

    let generate = if chain.is_empty() {
        "palettegen".to_string()
    } else {
        format!("{chain},palettegen")
    };

    let consume = if chain.is_empty() {
        "[0:v]fifo[x];[x][1:v]paletteuse".to_string()
    } else {
        format!("[0:v]{chain}[x];[x][1:v]paletteuse")
    };

    (generate, consume)
}
