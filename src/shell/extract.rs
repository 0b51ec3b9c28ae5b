use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBlock {
    /// 1-based position among the executable blocks of one reply.
    pub index: usize,
    pub script: String,
}

fn shell_fence() -> &'static Regex {
    static SHELL_FENCE: OnceLock<Regex> = OnceLock::new();
    SHELL_FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:sh|bash|shell|zsh)\b(.*?)```").expect("shell fence pattern is valid")
    })
}

/// Yields the fenced shell blocks of `text` left to right. An opening fence
/// without a closing one is left alone, as are fences tagged with anything
/// other than a shell.
pub fn extract(text: &str) -> impl Iterator<Item = ScriptBlock> + '_ {
    shell_fence()
        .captures_iter(text)
        .enumerate()
        .map(|(position, captures)| ScriptBlock {
            index: position + 1,
            script: captures[1].to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_block_keeps_body_verbatim() {
        let blocks: Vec<_> = extract("```sh\nls\n```").collect();
        assert_eq!(
            blocks,
            vec![ScriptBlock {
                index: 1,
                script: "\nls\n".to_string()
            }]
        );
    }

    #[test]
    fn test_shell_tag_variants_and_non_shell_tags() {
        let text = "```bash\necho a\n```\n```python\nprint(1)\n```\n```shell\necho b\n```\n```shx\nno\n```";
        let scripts: Vec<_> = extract(text).map(|block| block.script).collect();
        assert_eq!(scripts, vec!["\necho a\n", "\necho b\n"]);
    }

    #[test]
    fn test_prose_yields_nothing() {
        assert_eq!(extract("The monster group is the largest sporadic simple group.").count(), 0);
    }
}
