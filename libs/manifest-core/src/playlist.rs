/// Structured HLS playlists
///
/// A `Manifest` is either a master playlist (ordered variant streams) or a
/// media playlist (ordered segments). Parsing fixes the variant at the
/// boundary; downstream code never sees an ambiguous shape.
use crate::error::ParseError;

/// Closing tag for a finished media playlist.
pub const END_LIST_TAG: &str = "#EXT-X-ENDLIST\n";

/// Variant stream reference from a master playlist.
///
/// All attributes except `uri` are optional; absent attributes are never
/// invented during re-serialization. `frame_rate` is kept as raw text so
/// the original formatting survives a round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRef {
    pub uri: String,
    pub bandwidth: Option<u64>,
    pub resolution: Option<Resolution>,
    pub codecs: Option<String>,
    pub frame_rate: Option<String>,
    pub audio: Option<String>,
    pub video: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// One fixed-duration media segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub uri: String,
    pub duration: f64,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MasterPlaylist {
    pub variants: Vec<VariantRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub version: u32,
    pub target_duration: u32,
    pub media_sequence: Option<u64>,
    pub segments: Vec<Segment>,
    /// Whether the source carried `#EXT-X-ENDLIST`. An in-progress
    /// playlist must not gain the marker during rewriting.
    pub end_list: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

impl Manifest {
    /// Parse M3U8 text into a structured playlist.
    ///
    /// Presence of variant entries yields `Master`, presence of segment
    /// entries yields `Media`; neither is a terminal parse error.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut variants: Vec<VariantRef> = Vec::new();
        let mut segments: Vec<Segment> = Vec::new();
        let mut version: u32 = 3;
        let mut target_duration: Option<u32> = None;
        let mut media_sequence: Option<u64> = None;
        let mut end_list = false;

        let mut pending_variant: Option<VariantRef> = None;
        let mut pending_duration: Option<f64> = None;

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line == "#EXTM3U" {
                continue;
            }

            if let Some(value) = line.strip_prefix("#EXT-X-VERSION:") {
                version = value
                    .trim()
                    .parse()
                    .map_err(|_| ParseError::MalformedTag(line.to_string()))?;
            } else if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                target_duration = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ParseError::MalformedTag(line.to_string()))?,
                );
            } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                media_sequence = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ParseError::MalformedTag(line.to_string()))?,
                );
            } else if line == "#EXT-X-ENDLIST" {
                end_list = true;
            } else if let Some(value) = line.strip_prefix("#EXTINF:") {
                let duration_text = value.split(',').next().unwrap_or("").trim();
                let duration: f64 = duration_text
                    .parse()
                    .map_err(|_| ParseError::MalformedTag(line.to_string()))?;
                pending_duration = Some(duration);
            } else if let Some(value) = line.strip_prefix("#EXT-X-STREAM-INF:") {
                pending_variant = Some(parse_stream_inf(value)?);
            } else if line.starts_with('#') {
                // Unrecognized tags are passed over, not failed on.
                continue;
            } else if let Some(mut variant) = pending_variant.take() {
                variant.uri = line.to_string();
                variants.push(variant);
            } else if let Some(duration) = pending_duration.take() {
                let sequence = media_sequence.unwrap_or(0) + segments.len() as u64;
                segments.push(Segment {
                    uri: line.to_string(),
                    duration,
                    sequence,
                });
            }
        }

        if !variants.is_empty() {
            Ok(Manifest::Master(MasterPlaylist { variants }))
        } else if !segments.is_empty() {
            let target_duration = target_duration.unwrap_or_else(|| {
                segments
                    .iter()
                    .map(|s| s.duration.ceil() as u32)
                    .max()
                    .unwrap_or(1)
            });
            Ok(Manifest::Media(MediaPlaylist {
                version,
                target_duration,
                media_sequence,
                segments,
                end_list,
            }))
        } else {
            Err(ParseError::UnrecognizedShape)
        }
    }

    /// Ordered raw uris, in source order.
    pub fn uris(&self) -> Vec<&str> {
        match self {
            Manifest::Master(master) => master.variants.iter().map(|v| v.uri.as_str()).collect(),
            Manifest::Media(media) => media.segments.iter().map(|s| s.uri.as_str()).collect(),
        }
    }

    /// Substitute uris positionally with an already-resolved sequence.
    ///
    /// # Panics
    ///
    /// Panics when `resolved` does not match the entry count. A length
    /// mismatch is a programming error in the resolver, never a
    /// recoverable condition.
    pub fn rewrite(mut self, resolved: Vec<String>) -> Self {
        match &mut self {
            Manifest::Master(master) => {
                assert_eq!(
                    master.variants.len(),
                    resolved.len(),
                    "resolver returned {} uris for {} variants",
                    resolved.len(),
                    master.variants.len()
                );
                for (variant, uri) in master.variants.iter_mut().zip(resolved) {
                    variant.uri = uri;
                }
            }
            Manifest::Media(media) => {
                assert_eq!(
                    media.segments.len(),
                    resolved.len(),
                    "resolver returned {} uris for {} segments",
                    resolved.len(),
                    media.segments.len()
                );
                for (segment, uri) in media.segments.iter_mut().zip(resolved) {
                    segment.uri = uri;
                }
            }
        }
        self
    }

    /// Serialize back to playlist text.
    pub fn render(&self) -> String {
        match self {
            Manifest::Master(master) => master.render(),
            Manifest::Media(media) => media.render(),
        }
    }
}

impl MasterPlaylist {
    pub fn render(&self) -> String {
        let mut playlist = String::from("#EXTM3U\n");

        for variant in &self.variants {
            let mut attrs: Vec<String> = Vec::new();
            if let Some(bandwidth) = variant.bandwidth {
                attrs.push(format!("BANDWIDTH={}", bandwidth));
            }
            if let Some(resolution) = variant.resolution {
                attrs.push(format!(
                    "RESOLUTION={}x{}",
                    resolution.width, resolution.height
                ));
            }
            if let Some(codecs) = &variant.codecs {
                attrs.push(format!("CODECS=\"{}\"", codecs));
            }
            if let Some(frame_rate) = &variant.frame_rate {
                attrs.push(format!("FRAME-RATE={}", frame_rate));
            }
            if let Some(audio) = &variant.audio {
                attrs.push(format!("AUDIO=\"{}\"", audio));
            }
            if let Some(video) = &variant.video {
                attrs.push(format!("VIDEO=\"{}\"", video));
            }

            playlist.push_str(&format!("#EXT-X-STREAM-INF:{}\n", attrs.join(",")));
            playlist.push_str(&variant.uri);
            playlist.push('\n');
        }

        playlist
    }
}

impl MediaPlaylist {
    /// Header tags preceding the first segment entry.
    pub fn header(&self) -> String {
        let mut header = String::from("#EXTM3U\n");
        header.push_str(&format!("#EXT-X-VERSION:{}\n", self.version));
        header.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", self.target_duration));
        if let Some(sequence) = self.media_sequence {
            header.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", sequence));
        }
        header
    }

    pub fn render(&self) -> String {
        let mut playlist = self.header();
        for segment in &self.segments {
            playlist.push_str(&segment_entry(segment.duration, &segment.uri));
        }
        if self.end_list {
            playlist.push_str(END_LIST_TAG);
        }
        playlist
    }
}

/// One `#EXTINF` entry. Durations render with 6 decimal digits.
pub fn segment_entry(duration: f64, uri: &str) -> String {
    format!("#EXTINF:{:.6},\n{}\n", duration, uri)
}

fn parse_stream_inf(attributes: &str) -> Result<VariantRef, ParseError> {
    let mut variant = VariantRef {
        uri: String::new(),
        bandwidth: None,
        resolution: None,
        codecs: None,
        frame_rate: None,
        audio: None,
        video: None,
    };

    for attribute in split_attributes(attributes) {
        let Some((name, value)) = attribute.split_once('=') else {
            continue;
        };
        match name.trim() {
            "BANDWIDTH" => {
                variant.bandwidth = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ParseError::MalformedTag(attribute.to_string()))?,
                );
            }
            "RESOLUTION" => {
                let (width, height) = value
                    .trim()
                    .split_once('x')
                    .ok_or_else(|| ParseError::MalformedTag(attribute.to_string()))?;
                variant.resolution = Some(Resolution {
                    width: width
                        .parse()
                        .map_err(|_| ParseError::MalformedTag(attribute.to_string()))?,
                    height: height
                        .parse()
                        .map_err(|_| ParseError::MalformedTag(attribute.to_string()))?,
                });
            }
            "CODECS" => variant.codecs = Some(unquote(value)),
            "FRAME-RATE" => variant.frame_rate = Some(value.trim().to_string()),
            "AUDIO" => variant.audio = Some(unquote(value)),
            "VIDEO" => variant.video = Some(unquote(value)),
            _ => {}
        }
    }

    Ok(variant)
}

/// Split a tag attribute list on commas outside quoted values.
fn split_attributes(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;

    for (index, ch) in input.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&input[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches('"').to_string()
}
