// All LLM prompt constants for the generation pipeline.
// Reuses cross-cutting fragments from llm_client::prompts.

/// Separator the model is told to place between candidate documents.
pub const VERSION_DELIMITER: &str = "---VERSION---";

/// Keyword extraction prompt. Replace `{profile_block}` before sending.
pub const KEYWORD_PROMPT_TEMPLATE: &str = r#"Analyze the following club information and extract 5-10 keywords that describe the club visually:
{profile_block}

The keywords should represent themes, objects, or activities that can be used to find relevant images for this club.
Provide the keywords as a comma-separated list."#;

/// Content generation prompt.
/// Replace: {count_instruction}, {document_type}, {profile_block},
///          {template_section}, {image_section}, {format_instruction}
pub const GENERATION_PROMPT_TEMPLATE: &str = r#"{count_instruction} of a {document_type} for the following club:
{profile_block}
{template_section}
Each version should:
- Incorporate a cohesive color theme, effective use of borders, and layout design
- Fit on a single page, one-sided
{image_section}
{format_instruction}

Use HTML and CSS for complete control over the document's appearance. Be creative and artistic in your design! It will be rendered by the WeasyPrint library.

Consider using these elements to enhance the visual appeal:
- Dividing lines to separate sections (use <hr> tags with custom styles)
- Background colors or gradients for different sections
- Creative typography with varying font sizes and styles
- Icons or emojis to represent key points (use Unicode characters)
- Text boxes or callouts for important information

Include the following sections, but feel free to arrange them creatively:
1. Eye-catching title/header
2. Brief introduction
3. Mission statement
4. Key benefits of joining
5. Upcoming events or activities
6. How to join
7. Contact information

If asked to generate a document like a poster or flyer, don't structure it like a document: use unconventional placement. You don't have to convey every single piece of information given, just cover the parts that prospective members would want to see. A poster is constrained to one page single sided, so leave out what does not fit. Any taglines should be very short. Consider spacing between elements and keep it generous.

Implement the best 20% of ideas that will yield 80% of the impact, so there are few failure points.

{facts_instruction}

Below is an example of integrating an image with text in a way that looks nice:
<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Image and Text Integration</title>
<style>
    body { font-family: Arial, sans-serif; line-height: 1.6; margin: 20px; }
    .content { max-width: 800px; margin: 0 auto; }
    .text-image-container { display: flex; align-items: center; gap: 20px; }
    .text-image-container img { max-width: 40%; height: auto; border-radius: 8px; box-shadow: 0 4px 8px rgba(0, 0, 0, 0.1); }
    .text-image-container .text { flex: 1; }
    .text-image-container.reverse { flex-direction: row-reverse; }
</style>
</head>
<body>
<div class="content">
    <h1>Enhancing Your Content with Images</h1>
    <div class="text-image-container">
        <img src="example-image.jpg" alt="A beautiful landscape">
        <div class="text"><p>Align text and images side-by-side for a clean and professional look.</p></div>
    </div>
    <div class="text-image-container reverse">
        <img src="example-image-2.jpg" alt="A scenic cityscape">
        <div class="text"><p>Reverse the layout to keep the design balanced.</p></div>
    </div>
</div>
</body>
</html>"#;

/// Template section. Replace `{templates}`.
pub const TEMPLATE_SECTION_TEMPLATE: &str = r#"
Use the following templates as examples of basic designs. Each version should exceed their quality:
{templates}
"#;

/// Image section. Replace `{image_list}`.
pub const IMAGE_SECTION_TEMPLATE: &str =
    "- Use one of these image URLs in a way that enhances the design:\n{image_list}";

/// Multi-candidate format instruction. Replace `{count}` and `{delimiter}`.
pub const MULTI_FORMAT_TEMPLATE: &str = "Format your response as {count} complete HTML documents, \
    separated by \"{delimiter}\" markers. \
    Do not include any additional text or explanations outside the HTML structure.";

/// System prompt for the judge.
pub const JUDGE_SYSTEM: &str = "You are a graphic design and content evaluation expert.";

/// Judge prompt. Replace `{count}` and `{candidates}`.
pub const JUDGE_PROMPT_TEMPLATE: &str = r#"The following are the extracted contents from {count} posters. Analyze them and determine which is best based on the following criteria:
- Visual appeal (if inferred from text descriptions)
- Organization and clarity of content
- Overall effectiveness in delivering its message

Award a bonus to any poster that incorporates an image.

Rank the posters from best to worst and give a brief explanation for each placement. Refer to every poster by its label exactly as written (for example "Candidate 1").

{candidates}"#;

pub const KEYWORD_MAX_TOKENS: u32 = 200;
pub const KEYWORD_TEMPERATURE: f32 = 0.7;
/// Per-document output budget; multiplied by the candidate count.
pub const GENERATION_MAX_TOKENS_PER_CANDIDATE: u32 = 3000;
pub const GENERATION_MAX_TOKENS_CAP: u32 = 16_000;
pub const JUDGE_MAX_TOKENS: u32 = 800;
