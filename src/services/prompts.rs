//! Generation-prompt synthesis.
//!
//! New-content prompts are composed from several retrieved candidate prompts
//! rather than copying a single one, so consecutive generations for the same
//! taste do not collapse into near-duplicates. Style, camera, and lighting
//! vocabulary give the backend enough cinematic direction for a short clip.

use rand::seq::SliceRandom;
use rand::Rng;

const VISUAL_STYLES: &[&str] = &[
    "cinematic",
    "documentary",
    "vintage",
    "modern",
    "artistic",
    "commercial",
    "indie film",
    "experimental",
    "minimalist",
];

const CAMERA_MOVEMENTS: &[&str] = &[
    "steady shot",
    "handheld",
    "dolly zoom",
    "panning",
    "tracking shot",
    "aerial view",
    "low angle",
    "close-up",
];

const LIGHTING: &[&str] = &[
    "natural daylight",
    "golden hour",
    "blue hour",
    "neon lights",
    "studio lighting",
    "moonlight",
    "street lights",
];

const FALLBACK_TOPICS: &[&str] = &[
    "a cat trying to open a door with its paw",
    "someone attempting to parallel park and failing spectacularly",
    "a person cooking and accidentally adding salt instead of sugar",
    "someone trying to fold a fitted sheet and getting frustrated",
    "a person trying to catch a bus but missing it by seconds",
    "someone attempting to fix something with duct tape",
    "a person trying to take a photo of their food in terrible lighting",
];

/// First clause of a prompt, used as a theme fragment when blending.
fn theme_of(prompt: &str) -> &str {
    let trimmed = prompt.trim();
    let end = trimmed
        .find(['.', ',', ';'])
        .unwrap_or(trimmed.len())
        .min(120);
    trimmed[..end].trim_end()
}

/// Builds a generation prompt from up to three reference prompts.
///
/// With no references, falls back to a stock topic so the queue can still
/// be seeded for a brand-new index.
pub fn synthesize_prompt<R: Rng + ?Sized>(references: &[String], rng: &mut R) -> String {
    let style = VISUAL_STYLES.choose(rng).copied().unwrap_or("cinematic");
    let camera = CAMERA_MOVEMENTS.choose(rng).copied().unwrap_or("steady shot");
    let lighting = LIGHTING.choose(rng).copied().unwrap_or("natural daylight");

    let mut themes: Vec<&str> = references
        .iter()
        .map(|p| theme_of(p))
        .filter(|t| !t.is_empty())
        .take(3)
        .collect();

    if themes.is_empty() {
        let topic = FALLBACK_TOPICS.choose(rng).copied().unwrap_or(FALLBACK_TOPICS[0]);
        return format!(
            "A {} shot with {} movement captures {}. The scene is bathed in {}, \
             framed for a short, visually engaging clip.",
            style, camera, topic, lighting
        );
    }

    themes.shuffle(rng);
    let subject = themes[0];
    let accents = themes[1..].join("; ");

    if accents.is_empty() {
        format!(
            "A {} shot with {} movement captures {}, but with a fresh twist on the scenario. \
             The scene is bathed in {}, framed for a short, visually engaging clip.",
            style, camera, subject, lighting
        )
    } else {
        format!(
            "A {} shot with {} movement captures {}, echoing the mood of {}. \
             The scene is bathed in {}, framed for a short, visually engaging clip.",
            style, camera, subject, accents, lighting
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn blends_multiple_references() {
        let mut rng = StdRng::seed_from_u64(7);
        let refs = vec![
            "A dog surfing a huge wave, sunny beach".to_string(),
            "A skateboarder grinding a neon rail at night".to_string(),
            "A chef flipping pancakes in slow motion".to_string(),
        ];
        let prompt = synthesize_prompt(&refs, &mut rng);

        let used = refs
            .iter()
            .filter(|r| prompt.contains(theme_of(r)))
            .count();
        assert!(used >= 2, "prompt should draw on several references: {prompt}");
    }

    #[test]
    fn falls_back_without_references() {
        let mut rng = StdRng::seed_from_u64(7);
        let prompt = synthesize_prompt(&[], &mut rng);
        assert!(!prompt.is_empty());
        assert!(prompt.contains("shot"));
    }

    #[test]
    fn theme_stops_at_first_clause() {
        assert_eq!(theme_of("A dog surfing, sunny beach"), "A dog surfing");
        assert_eq!(theme_of("  plain theme  "), "plain theme");
    }
}
