//! Grading request construction.
//!
//! Turns a task, its prompt and a student essay into the instruction
//! document sent to the examiner model. The builder is pure: the same
//! [`GradingContext`] always yields byte-identical [`GradingInstructions`].

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::band::ROUNDING_RULE;
use crate::model::{word_count, Band, Criterion, Subtype, TaskType};

/// One band level of a criterion descriptor.
struct Descriptor {
    band: u8,
    text: &'static str,
}

const TASK_ACHIEVEMENT: &[Descriptor] = &[
    Descriptor { band: 9, text: "All requirements of the task are fully and appropriately satisfied. There may be extremely rare lapses in content." },
    Descriptor { band: 8, text: "The response covers all the requirements of the task appropriately, relevantly and sufficiently. Key features are skilfully selected, and clearly presented, highlighted and illustrated. There may be occasional omissions or lapses in content." },
    Descriptor { band: 7, text: "The response covers the requirements of the task. The content is relevant and accurate, with a few omissions or lapses. A clear overview is presented; key features are covered and clearly highlighted but could be more fully or more appropriately illustrated or extended." },
    Descriptor { band: 6, text: "The response focuses on the requirements of the task and an appropriate format is used. Key features are covered and adequately highlighted. A relevant overview is attempted. Information is appropriately selected and supported using figures/data, though some details may be irrelevant, inappropriate or inaccurate." },
    Descriptor { band: 5, text: "The response generally addresses the requirements of the task. The format may be inappropriate in places. Key features are not adequately covered. The recounting of detail is mainly mechanical. There may be no data to support the description. There may be a tendency to focus on details without referring to the bigger picture, and inaccuracies in detail." },
    Descriptor { band: 4, text: "The response is an attempt to address the task. Few key features have been selected. The format may be inappropriate. Key features which are selected may be irrelevant, repetitive, inaccurate or inappropriate." },
];

const TASK_RESPONSE: &[Descriptor] = &[
    Descriptor { band: 9, text: "The prompt is appropriately addressed and explored in depth. A clear and fully developed position is presented which directly answers the question/s. Ideas are relevant, fully extended and well supported. Any lapses in content or support are extremely rare." },
    Descriptor { band: 8, text: "The prompt is appropriately and sufficiently addressed. A clear and well-developed position is presented in response to the question/s. Ideas are relevant, well extended and supported. There may be occasional omissions or lapses in content." },
    Descriptor { band: 7, text: "The main parts of the prompt are appropriately addressed. A clear and developed position is presented. Main ideas are extended and supported but there may be a tendency to over-generalise or there may be a lack of focus and precision in supporting ideas/material." },
    Descriptor { band: 6, text: "The main parts of the prompt are addressed (though some may be more fully covered than others). An appropriate format is used. A position is presented that is directly relevant to the prompt, although the conclusions drawn may be unclear, unjustified or repetitive. Main ideas are relevant, but some may be insufficiently developed or may lack clarity, while some supporting arguments and evidence may be less relevant or inadequate." },
    Descriptor { band: 5, text: "The main parts of the prompt are incompletely addressed. The format may be inappropriate in places. The writer expresses a position, but the development is not always clear. Some main ideas are put forward, but they are limited and are not sufficiently developed and/or there may be irrelevant detail. There may be some repetition." },
    Descriptor { band: 4, text: "The prompt is tackled in a minimal way, or the answer is tangential, possibly due to some misunderstanding of the prompt. The format may be inappropriate. A position is discernible, but the reader has to read carefully to find it. Main ideas are difficult to identify and such ideas that are identifiable may lack relevance, clarity and/or support. Large parts of the response may be repetitive." },
];

const COHERENCE_COHESION: &[Descriptor] = &[
    Descriptor { band: 9, text: "The message can be followed effortlessly. Cohesion is used in such a way that it very rarely attracts attention. Any lapses in coherence or cohesion are minimal. Paragraphing is skilfully managed." },
    Descriptor { band: 8, text: "The message can be followed with ease. Information and ideas are logically sequenced, and cohesion is well managed. Occasional lapses in coherence and cohesion may occur. Paragraphing is used sufficiently and appropriately." },
    Descriptor { band: 7, text: "Information and ideas are logically organised, and there is a clear progression throughout the response. A few lapses may occur, but these are minor. A range of cohesive devices including reference and substitution is used flexibly but with some inaccuracies or some over/under use. Paragraphing is generally used effectively to support overall coherence." },
    Descriptor { band: 6, text: "Information and ideas are generally arranged coherently and there is a clear overall progression. Cohesive devices are used to some good effect but cohesion within and/or between sentences may be faulty or mechanical due to misuse, overuse or omission. The use of reference and substitution may lack flexibility or clarity and result in some repetition or error. Paragraphing may not always be logical." },
    Descriptor { band: 5, text: "Organisation is evident but is not wholly logical and there may be a lack of overall progression. Nevertheless, there is a sense of underlying coherence to the response. The relationship of ideas can be followed but the sentences are not fluently linked to each other. There may be limited/overuse of cohesive devices with some inaccuracy. The writing may be repetitive due to inadequate and/or inaccurate use of reference and substitution. Paragraphing may be inadequate or missing." },
    Descriptor { band: 4, text: "Information and ideas are evident but not arranged coherently and there is no clear progression within the response. Relationships between ideas can be unclear and/or inadequately marked. There is some use of basic cohesive devices, which may be inaccurate or repetitive. There is inaccurate use or a lack of substitution or referencing. There may be no paragraphing and/or no clear main topic within paragraphs." },
];

const LEXICAL_RESOURCE: &[Descriptor] = &[
    Descriptor { band: 9, text: "Full flexibility and precise use are widely evident. A wide range of vocabulary is used accurately and appropriately with very natural and sophisticated control of lexical features. Minor errors in spelling and word formation are extremely rare and have minimal impact on communication." },
    Descriptor { band: 8, text: "A wide resource is fluently and flexibly used to convey precise meanings. There is skilful use of uncommon and/or idiomatic items when appropriate, despite occasional inaccuracies in word choice and collocation. Occasional errors in spelling and/or word formation may occur, but have minimal impact on communication." },
    Descriptor { band: 7, text: "The resource is sufficient to allow some flexibility and precision. There is some ability to use less common and/or idiomatic items. An awareness of style and collocation is evident, though inappropriacies occur. There are only a few errors in spelling and/or word formation and they do not detract from overall clarity." },
    Descriptor { band: 6, text: "The resource is generally adequate and appropriate for the task. The meaning is generally clear in spite of a rather restricted range or a lack of precision in word choice. If the writer is a risk-taker, there will be a wider range of vocabulary used but higher degrees of inaccuracy or inappropriacy. There are some errors in spelling and/or word formation, but these do not impede communication." },
    Descriptor { band: 5, text: "The resource is limited but minimally adequate for the task. Simple vocabulary may be used accurately but the range does not permit much variation in expression. There may be frequent lapses in the appropriacy of word choice and a lack of flexibility is apparent in frequent simplifications and/or repetitions. Errors in spelling and/or word formation may be noticeable and may cause some difficulty for the reader." },
    Descriptor { band: 4, text: "The resource is limited and inadequate for or unrelated to the task. Vocabulary is basic and may be used repetitively. There may be inappropriate use of lexical chunks (e.g. memorised phrases, formulaic language and/or language from the input material). Inappropriate word choice and/or errors in word formation and/or in spelling may impede meaning." },
];

const GRAMMATICAL_RANGE: &[Descriptor] = &[
    Descriptor { band: 9, text: "A wide range of structures is used with full flexibility and control. Punctuation and grammar are used appropriately throughout. Minor errors are extremely rare and have minimal impact on communication." },
    Descriptor { band: 8, text: "A wide range of structures is flexibly and accurately used. The majority of sentences are error-free, and punctuation is well managed. Occasional, non-systematic errors and inappropriacies occur, but have minimal impact on communication." },
    Descriptor { band: 7, text: "A variety of complex structures is used with some flexibility and accuracy. Grammar and punctuation are generally well controlled, and error-free sentences are frequent. A few errors in grammar may persist, but these do not impede communication." },
    Descriptor { band: 6, text: "A mix of simple and complex sentence forms is used but flexibility is limited. Examples of more complex structures are not marked by the same level of accuracy as in simple structures. Errors in grammar and punctuation occur, but rarely impede communication." },
    Descriptor { band: 5, text: "The range of structures is limited and rather repetitive. Although complex sentences are attempted, they tend to be faulty, and the greatest accuracy is achieved on simple sentences. Grammatical errors may be frequent and cause some difficulty for the reader. Punctuation may be faulty." },
    Descriptor { band: 4, text: "A very limited range of structures is used. Subordinate clauses are rare and simple sentences predominate. Some structures are produced accurately but grammatical errors are frequent and may impede meaning. Punctuation is often faulty or inadequate." },
];

fn descriptors(criterion: Criterion, task: TaskType) -> &'static [Descriptor] {
    match (criterion, task) {
        (Criterion::Task, TaskType::Task1) => TASK_ACHIEVEMENT,
        (Criterion::Task, TaskType::Task2) => TASK_RESPONSE,
        (Criterion::Coherence, _) => COHERENCE_COHESION,
        (Criterion::Lexical, _) => LEXICAL_RESOURCE,
        (Criterion::Grammar, _) => GRAMMATICAL_RANGE,
    }
}

const EXAMINER_ROLE: &str = "You are a senior IELTS Academic Writing examiner. You mark strictly against the official public band descriptors and you never inflate scores.";

const MARKING_DIRECTIVES: &[&str] = &[
    "Award each criterion a band from 4 to 9 in half-band steps. Use the descriptor that best fits the whole response, not its best sentence.",
    "Every feedback statement must be grounded in evidence: quote or closely paraphrase the essay when you praise or criticise it.",
    "Do not inflate scores. When torn between two bands, award the lower one unless the essay clearly meets every feature of the higher band.",
    "Under-length responses are penalised through the task criterion as the descriptors require; mention the shortfall in wordCountNote. Do not refuse to mark a short essay.",
    "Memorised or off-topic material must not be credited.",
    "Priority improvements must be concrete, actionable and ordered from most to least impactful.",
    "The model paragraph must rewrite one paragraph of the student's essay at roughly one band above their overall band, keeping their ideas.",
];

/// Everything the builder needs to know about one grading request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradingContext {
    pub task: Option<TaskType>,
    pub subtype: Option<Subtype>,
    pub prompt_text: String,
    /// Description or data of the chart, table, process or map.
    pub visual_data: Option<String>,
    pub essay: String,
    /// Student's goal, used to calibrate the coaching tone.
    pub target_band: Option<Band>,
    /// Most recent attempts first.
    pub prior_attempts: Vec<PriorAttempt>,
}

/// Summary of an earlier graded attempt, for adaptive marking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorAttempt {
    pub task: TaskType,
    pub overall_band: Band,
    pub weakest: Criterion,
}

impl GradingContext {
    pub fn task(&self) -> TaskType {
        self.task.unwrap_or(TaskType::Task2)
    }
}

/// The two halves of the instruction document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingInstructions {
    /// Examiner role, directives, rubric, rounding rule and output schema.
    pub system: String,
    /// Task, prompt, essay and adaptive context.
    pub user: String,
}

/// Build the instruction document for one grading request.
pub fn build_grading_instructions(ctx: &GradingContext) -> GradingInstructions {
    let task = ctx.task();
    GradingInstructions {
        system: build_system(task),
        user: build_user(task, ctx),
    }
}

/// The rubric text for one task type, bands 9 down to 4.
pub fn rubric_text(task: TaskType) -> String {
    let mut out = String::new();
    for criterion in task.criteria() {
        let _ = writeln!(
            out,
            "### {} ({})",
            criterion.name(task),
            criterion.key(task)
        );
        for d in descriptors(criterion, task) {
            let _ = writeln!(out, "Band {}: {}", d.band, d.text);
        }
        out.push('\n');
    }
    out
}

fn build_system(task: TaskType) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{EXAMINER_ROLE}\n");

    out.push_str("## Marking directives\n");
    for (i, directive) in MARKING_DIRECTIVES.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, directive);
    }

    let _ = writeln!(
        out,
        "\n## Band descriptors for IELTS Academic {}\n",
        task.title()
    );
    out.push_str(&rubric_text(task));

    let _ = writeln!(out, "## Overall band rounding\n{ROUNDING_RULE}\n");

    out.push_str("## Output format\n");
    out.push_str(&output_schema(task));
    out
}

/// Description of the JSON object the examiner must return.
pub fn output_schema(task: TaskType) -> String {
    let mut criteria = String::new();
    for criterion in task.criteria() {
        let _ = writeln!(
            criteria,
            "    \"{}\": {{ \"band\": <number 4-9, half steps>, \"label\": \"{}\", \"feedback\": \"<evidence-based feedback>\", \"bandRationale\": \"<why this band and not the next one up>\" }},",
            criterion.key(task),
            criterion.name(task),
        );
    }
    let criteria = criteria.trim_end().trim_end_matches(',');

    format!(
        "Return ONLY one JSON object, with no prose before or after it and no markdown. Use exactly these keys:\n\
{{\n  \"taskType\": \"{task}\",\n  \"wordCount\": <integer>,\n  \"wordCountNote\": \"<comment on length against the {min}-word minimum>\",\n  \"criteriaScores\": {{\n{criteria}\n  }},\n  \"overallBand\": <number, per the rounding rule>,\n  \"examinerSummary\": \"<3-4 sentence overall judgement>\",\n  \"taskSpecificFeedback\": \"<feedback specific to this {title} question type>\",\n  \"priorityImprovements\": [\"<most impactful first, at least one>\"],\n  \"vocabularyHighlights\": {{ \"effective\": [\"<word or phrase>\"], \"problematic\": [\"<word or phrase>\"] }},\n  \"errorAnnotations\": [{{ \"quote\": \"<exact text>\", \"type\": \"Grammar|Vocabulary|Spelling|Punctuation\", \"issue\": \"<what is wrong>\", \"correction\": \"<corrected text>\" }}],\n  \"modelParagraph\": \"<improved rewrite of one paragraph>\",\n  \"originalParagraph\": \"<the paragraph you rewrote, verbatim>\",\n  \"comparativeLevel\": \"<how this compares with typical responses at the awarded band>\"\n}}\n",
        task = task,
        min = task.min_words(),
        title = task.title(),
        criteria = criteria,
    )
}

fn build_user(task: TaskType, ctx: &GradingContext) -> String {
    let mut out = String::new();
    let _ = write!(out, "IELTS Academic {}", task.title());
    if let Some(subtype) = ctx.subtype {
        let _ = write!(out, " ({})", subtype.label());
    }
    let _ = writeln!(out, " question:\n{}\n", ctx.prompt_text.trim());

    if let Some(visual) = ctx.visual_data.as_deref().map(str::trim) {
        if !visual.is_empty() {
            let _ = writeln!(out, "Visual information provided to the candidate:\n{visual}\n");
        }
    }

    let words = word_count(&ctx.essay);
    let _ = writeln!(
        out,
        "Student essay ({words} words; minimum {} words, suggested time {} minutes):\n{}\n",
        task.min_words(),
        task.suggested_minutes(),
        ctx.essay.trim()
    );

    if ctx.target_band.is_some() || !ctx.prior_attempts.is_empty() {
        out.push_str("Candidate context (do not let it change the bands you award):\n");
        if let Some(target) = ctx.target_band {
            let _ = writeln!(out, "- Target band: {target}");
        }
        for attempt in &ctx.prior_attempts {
            let _ = writeln!(
                out,
                "- Earlier {} attempt: overall {}, weakest criterion {}",
                attempt.task,
                attempt.overall_band,
                attempt.weakest.name(attempt.task)
            );
        }
        out.push_str("Tailor the priority improvements to close the gap to the target.\n\n");
    }

    out.push_str("Mark strictly. Return ONLY the JSON object.");
    out
}
