/// 测验及格线（百分制，含边界）
pub const PASS_THRESHOLD: u8 = 50;

/// 低于此分数的单元视为薄弱点，用于生成巩固单元
pub const WEAK_SCORE_THRESHOLD: u8 = 70;

/// 简化版本复杂度分档：低于此分数为 "very basic"
pub const VERY_BASIC_SCORE_BAND: u8 = 20;

/// 简化版本复杂度分档：低于此分数为 "basic"，其余为 "simplified"
pub const BASIC_SCORE_BAND: u8 = 35;

/// 生成课程的章节数上下限
pub const MIN_CHAPTERS: u32 = 1;
pub const MAX_CHAPTERS: u32 = 10;

/// 单个测验的题目数上下限
pub const MIN_QUIZ_QUESTIONS: usize = 1;
pub const MAX_QUIZ_QUESTIONS: usize = 10;

/// 单题选项数上下限
pub const MIN_ANSWER_OPTIONS: usize = 2;
pub const MAX_ANSWER_OPTIONS: usize = 6;

/// 同一课程内主章节的序号间隔；补救章节占用原章节序号 + 1
pub const CONTAINER_ORDINAL_STRIDE: u32 = 100;

/// 补救章节与巩固章节的标题前缀
pub const REMEDIAL_TITLE_PREFIX: &str = "Simplified";
pub const REINFORCEMENT_TITLE_PREFIX: &str = "Reinforcement";

/// 生成内容时携带的错题明细上限
pub const MAX_WRONG_ANSWERS_IN_PROMPT: usize = 10;

/// 单次生成尝试之间退避时长的上限（毫秒）
pub const MAX_RETRY_BACKOFF_MS: u64 = 30_000;
