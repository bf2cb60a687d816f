// Prompt template for course generation.
// Placeholders are filled by `build_course_prompt` in generator.rs.

/// Course generation prompt. Replace `{topic}`, `{language}`, `{depth_level}`,
/// `{voice_tone}` and `{cover_image}` before sending.
pub const COURSE_PROMPT_TEMPLATE: &str = r#"You are an expert online-course author with deep experience in instructional design.

Write a complete, well-structured course in {language} about the topic below. Keep the
voice tone and depth level consistent from start to finish.

Topic: {topic}
Depth level: {depth_level}
Voice tone: {voice_tone}
Generate cover image: {cover_image}

Instructions:
- Title: use the topic as the course title.
- Subtitle: one concise, engaging sentence that names a key benefit or the scope of the course.
- Introduction: a short HTML paragraph that welcomes the learner.
- Cover image: if "Generate cover image" is "yes", put a detailed description of a relevant,
  high-quality cover image in "wallpaper". Otherwise set "wallpaper" to an empty string.
- Structure: 3 sequential modules, each with a clear title and 6 lessons.
  Each module also has a creative one-word "chapter" name for sidebar navigation.
  Number lessons as "<module>.<lesson>", e.g. "1.1 Getting started".
- Lesson content: clear, detailed, didactic explanations in HTML, at most 500 words per lesson,
  with practical examples and analogies suited to the depth level.
- Practice activities: at the end of each module, exercises or case studies (at most 150 words,
  HTML), with a suggested solution when applicable.
- Final summary: an HTML recap of the whole course, at most 150 words.
- Assessment quiz: 10 multiple-choice questions. Every question has exactly 4 alternatives and
  exactly ONE of them has "is_correct": true.
- Allowed HTML tags (body content only): p, strong, em, ul, li, code, pre, h1-h6, a, img (with src and alt).

OUTPUT FORMAT (JSON):
Reply ONLY with valid JSON in exactly this shape, with no text before or after it:

{
  "title": "Course title",
  "subtitle": "Course subtitle",
  "introduction": "<p>Introduction...</p>",
  "wallpaper": "Cover image description or empty string",
  "modules": [
    {
      "module_title": "Module 1 title",
      "chapter": "OneWord",
      "lessons": [
        {"lesson_title": "1.1 Lesson title", "content": "<p>Lesson content...</p>"}
      ],
      "practice_activities": [
        {"title": "Activity title", "content": "<p>Activity description...</p>"}
      ]
    }
  ],
  "final_summary": {"title": "Final summary", "content": "<p>Summary...</p>"},
  "assessment_quiz": [
    {
      "text": "Question 1?",
      "alternatives": [
        {"text": "Alternative A", "is_correct": false},
        {"text": "Alternative B", "is_correct": true},
        {"text": "Alternative C", "is_correct": false},
        {"text": "Alternative D", "is_correct": false}
      ]
    }
  ]
}

IMPORTANT: Reply ONLY with the JSON object. No explanations, comments or extra text."#;
