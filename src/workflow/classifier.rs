//! 任务分类：判断任务需要哪些专家类别
//!
//! TaskClassifier 是可替换的窄接口（例如换成模型驱动的规划器）；默认的 KeywordClassifier
//! 把任务转小写后做子串匹配（"findings" 命中 find，"database" 命中 data）。

use std::collections::BTreeSet;

use crate::workflow::AgentCategory;

pub trait TaskClassifier: Send + Sync {
    /// 命中的类别（BTreeSet 按 research -> analysis -> writing 排序）
    fn classify(&self, task: &str) -> BTreeSet<AgentCategory>;
}

/// 关键词分类器
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    keywords: Vec<(AgentCategory, Vec<String>)>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        let table: [(AgentCategory, &[&str]); 3] = [
            (
                AgentCategory::Research,
                &["research", "find", "information", "facts", "data"],
            ),
            (
                AgentCategory::Analysis,
                &["analyze", "insights", "patterns", "why", "compare"],
            ),
            (
                AgentCategory::Writing,
                &["write", "draft", "create", "summarize", "explain"],
            ),
        ];
        Self {
            keywords: table
                .into_iter()
                .map(|(c, words)| (c, words.iter().map(|w| w.to_string()).collect()))
                .collect(),
        }
    }

    /// 替换某个类别的关键词表
    pub fn with_keywords(mut self, category: AgentCategory, words: &[&str]) -> Self {
        let words: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
        match self.keywords.iter_mut().find(|(c, _)| *c == category) {
            Some((_, existing)) => *existing = words,
            None => self.keywords.push((category, words)),
        }
        self
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskClassifier for KeywordClassifier {
    fn classify(&self, task: &str) -> BTreeSet<AgentCategory> {
        let lower = task.to_lowercase();
        self.keywords
            .iter()
            .filter(|(_, kws)| kws.iter().any(|k| lower.contains(k.as_str())))
            .map(|(c, _)| *c)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_multiple_categories() {
        let c = KeywordClassifier::new();
        let got = c.classify("Research the current state of AI agents and write a summary of key trends");
        assert_eq!(
            got.into_iter().collect::<Vec<_>>(),
            vec![AgentCategory::Research, AgentCategory::Writing]
        );
    }

    #[test]
    fn test_case_insensitive_substrings() {
        let c = KeywordClassifier::new();
        assert_eq!(
            c.classify("WHY is the sky blue?").into_iter().collect::<Vec<_>>(),
            vec![AgentCategory::Analysis]
        );
        assert_eq!(
            c.classify("Summarize the findings").into_iter().collect::<Vec<_>>(),
            vec![AgentCategory::Research, AgentCategory::Writing]
        );
        assert_eq!(
            c.classify("Keep researching this").into_iter().collect::<Vec<_>>(),
            vec![AgentCategory::Research]
        );
        assert!(c.classify("Check the database").contains(&AgentCategory::Research));
        assert!(c.classify("hello there").is_empty());
    }

    #[test]
    fn test_custom_keywords() {
        let c = KeywordClassifier::new().with_keywords(AgentCategory::Writing, &["Poem"]);
        assert!(c.classify("a poem please").contains(&AgentCategory::Writing));
        assert!(c.classify("write it").is_empty());
    }
}
