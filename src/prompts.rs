//! Prompt templates for each model call.

use crate::models::{GenerationRequest, MemePlan, TextBlock};

/// Asks the text model for a [MemePlan].
pub fn planning_prompt(request: &GenerationRequest) -> String {
    let restrictions = if request.restrictions.trim().is_empty() {
        "None"
    } else {
        request.restrictions.as_str()
    };
    format!(
        r#"You are a creative meme strategist. Plan a meme with the following parameters:

Theme: {theme}
Humor Type: {humor_type}
Restrictions: {restrictions}

Create a detailed meme plan that includes:
1. Visual concept description for image generation
2. Key visual elements that should be in the image
3. Overall mood and style
4. Text structure (how many text blocks will be needed)
5. Brief description of the joke/humor concept

Respond with a JSON object containing:
{{
    "visual_concept": "detailed description for image generation",
    "visual_elements": ["element1", "element2", "element3"],
    "mood": "mood description",
    "style": "visual style",
    "text_blocks_needed": 2,
    "humor_concept": "brief description of the joke"
}}"#,
        theme = request.theme,
        humor_type = request.humor_type,
    )
}

/// Turns a plan into an image model prompt.
pub fn base_image_prompt(plan: &MemePlan) -> String {
    format!(
        r#"{concept}

Visual elements to include: {elements}
Mood: {mood}
Style: {style}

Create a clear, high-quality image suitable for meme text overlay.
The image should have good contrast and space for text placement.
Make it look like a typical meme template with clear areas for text."#,
        concept = plan.visual_concept,
        elements = plan.visual_elements.join(", "),
        mood = plan.mood,
        style = plan.style,
    )
}

/// Asks the text model to write text for the attached base image.
pub fn meme_text_prompt(plan: &MemePlan) -> String {
    format!(
        r#"You are a meme text writer. Looking at this image, create funny meme text based on:

Humor concept: {humor}
Number of text blocks needed: {blocks}

Analyze the image and create appropriate meme text that:
1. Fits the visual elements in the image
2. Follows the humor concept
3. Is properly structured for the number of text blocks needed
4. Follows classic meme format (usually top text and bottom text)

Respond with JSON:
{{
    "text_blocks": [
        {{"text": "TOP TEXT HERE", "position": "top", "style": "bold", "color": "white"}},
        {{"text": "BOTTOM TEXT HERE", "position": "bottom", "style": "bold", "color": "white"}}
    ]
}}"#,
        humor = plan.humor_concept,
        blocks = plan.text_blocks_needed,
    )
}

/// "TOP TEXT: 'foo' in white color with black outline"
pub fn describe_text_block(block: &TextBlock) -> String {
    format!(
        "{} TEXT: '{}' in {} color with black outline",
        block.position.to_string().to_uppercase(),
        block.text,
        block.color
    )
}

/// Describes how the final meme should look with the text applied.
pub fn overlay_prompt(blocks: &[TextBlock]) -> String {
    let descriptions: Vec<String> = blocks.iter().map(describe_text_block).collect();
    format!(
        r#"Create a meme by adding text to this image. The text should be in classic meme font style (bold, impact-like font).

Text to add:
{text}

Requirements:
- Use bold, thick meme font (similar to Impact font)
- Add black outline/stroke around all text for maximum readability
- Make text large and clearly visible
- Position top text near the top of the image
- Position bottom text near the bottom of the image
- Ensure text doesn't cover important visual elements
- Use proper meme text formatting (ALL CAPS if appropriate)
- Make sure the text is perfectly readable against the background

Generate the final meme image with all text overlays applied."#,
        text = descriptions.join(" | ")
    )
}

/// Sent with the base image to the image-capable text model.
pub fn recreate_with_text_prompt(overlay: &str) -> String {
    format!(
        r#"Analyze this image and describe it in detail for recreation purposes.
Then create a new version of this exact same image but with meme text added as specified:

{overlay}

Recreate the image maintaining all visual elements, colors, composition, and style,
but add the specified meme text with proper formatting."#
    )
}

/// Used when the model won't draw: get a prompt the image model can use instead.
pub fn regeneration_prompt(overlay: &str) -> String {
    format!(
        r#"Analyze this image and create a detailed prompt for regenerating it with meme text.

{overlay}

Create a comprehensive image generation prompt that:
1. Describes the current image in detail
2. Specifies where and how to add the meme text
3. Ensures the text is readable and properly formatted

Format your response as a single detailed prompt for image generation."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TextPosition;

    fn request(restrictions: &str) -> GenerationRequest {
        GenerationRequest {
            theme: "cats".to_string(),
            humor_type: "absurd".to_string(),
            restrictions: restrictions.to_string(),
            index: 1,
        }
    }

    #[test]
    fn planning_prompt_defaults_restrictions() {
        let prompt = planning_prompt(&request("  "));
        assert!(prompt.contains("Theme: cats"));
        assert!(prompt.contains("Humor Type: absurd"));
        assert!(prompt.contains("Restrictions: None"));
        assert!(prompt.contains(r#""text_blocks_needed": 2"#));

        let prompt = planning_prompt(&request("no profanity"));
        assert!(prompt.contains("Restrictions: no profanity"));
    }

    #[test]
    fn base_image_prompt_lists_elements() {
        let plan = MemePlan {
            visual_concept: "a cat judging a laptop".to_string(),
            visual_elements: vec!["cat".to_string(), "laptop".to_string()],
            mood: "smug".to_string(),
            style: "photo".to_string(),
            ..Default::default()
        };
        let prompt = base_image_prompt(&plan);
        assert!(prompt.starts_with("a cat judging a laptop"));
        assert!(prompt.contains("Visual elements to include: cat, laptop"));
        assert!(prompt.contains("Mood: smug"));
    }

    #[test]
    fn overlay_prompt_joins_blocks() {
        let blocks = vec![
            TextBlock {
                text: "when the build passes".to_string(),
                position: TextPosition::Top,
                style: "bold".to_string(),
                color: "white".to_string(),
            },
            TextBlock {
                text: "first try".to_string(),
                position: TextPosition::Custom("caption".to_string()),
                style: "bold".to_string(),
                color: "yellow".to_string(),
            },
        ];
        let prompt = overlay_prompt(&blocks);
        assert!(prompt.contains(
            "TOP TEXT: 'when the build passes' in white color with black outline | CAPTION TEXT: 'first try' in yellow color with black outline"
        ));
    }
}
