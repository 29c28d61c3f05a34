//////////////////////////////////////////////////////////////////
/// Tokenizer
///
/// Line-oriented lexer. One call produces the token vector of one logical
/// input line. A line whose first non-blank character is `:` pulls in
/// further lines until one contains `;`, so a colon definition always
/// arrives as a single token vector.
///
/// Tokens are split on whitespace and (when the environment is
/// case-insensitive) folded to upper case, except inside two kinds of span
/// which preserve user text: the quote family (`."  ,"  ABORT"  C"  S"` up
/// to the closing `"`) and `(` up to `)`. The scanner tracks one skip flag
/// per span kind and toggles it on the span boundaries. A bare `\` outside
/// any span discards the rest of its physical line.
///
use crate::files::FileHandle;

const QUOTE_OPENERS: [&str; 5] = [".\"", ",\"", "ABORT\"", "C\"", "S\""];

pub struct Tokenizer {
    case_insensitive: bool,
}

impl Tokenizer {
    pub fn new(case_insensitive: bool) -> Tokenizer {
        Tokenizer { case_insensitive }
    }

    /// Read one logical line from the top reader and return its tokens.
    ///
    ///     An empty vector means "nothing to evaluate, ask again" (a blank
    ///     line, or the top reader was exhausted and popped). None means all
    ///     input is gone.
    pub fn next_tokens(&self, readers: &mut Vec<FileHandle>) -> Option<Vec<String>> {
        let top = readers.last_mut()?;
        match top.get_line() {
            None => {
                readers.pop();
                if readers.is_empty() {
                    None
                } else {
                    Some(Vec::new())
                }
            }
            Some(line) => {
                let mut logical = line;
                if logical.trim_start().starts_with(':') {
                    // a colon definition is one logical input
                    while !logical.contains(';') {
                        match readers.last_mut()?.get_line() {
                            Some(next) => {
                                logical.push('\n');
                                logical.push_str(&next);
                            }
                            None => break,
                        }
                    }
                }
                Some(self.scan(&logical))
            }
        }
    }

    /// Split a logical line into tokens, folding case outside skip spans.
    pub fn scan(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut in_quote = false;
        let mut in_paren = false;
        for line in text.lines() {
            for raw in line.split_whitespace() {
                if in_quote {
                    tokens.push(raw.to_string());
                    if raw.ends_with('"') {
                        in_quote = false;
                    }
                    continue;
                }
                if in_paren {
                    tokens.push(raw.to_string());
                    if raw.ends_with(')') {
                        in_paren = false;
                    }
                    continue;
                }
                if raw == "\\" {
                    break; // line comment
                }
                let token = if self.case_insensitive {
                    raw.to_uppercase()
                } else {
                    raw.to_string()
                };
                if QUOTE_OPENERS.contains(&token.as_str()) {
                    in_quote = true;
                } else if token == "(" {
                    in_paren = true;
                }
                tokens.push(token);
            }
        }
        tokens
    }
}

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use super::*;
    use crate::internals::messages::Msg;

    fn scan(text: &str) -> Vec<String> {
        Tokenizer::new(true).scan(text)
    }

    #[test]
    fn test_basic_split_and_fold() {
        assert_eq!(scan("1 2 dup swap"), vec!["1", "2", "DUP", "SWAP"]);
    }

    #[test]
    fn test_quote_span_preserves_text() {
        assert_eq!(scan(".\" Hello world\" cr"), vec![".\"", "Hello", "world\"", "CR"]);
        assert_eq!(scan("s\" lower Case\""), vec!["S\"", "lower", "Case\""]);
        assert_eq!(scan("abort\" too Far\""), vec!["ABORT\"", "too", "Far\""]);
    }

    #[test]
    fn test_paren_span_preserves_text() {
        assert_eq!(scan("( a b -- B ) drop"), vec!["(", "a", "b", "--", "B", ")", "DROP"]);
    }

    #[test]
    fn test_backslash_strips_rest_of_line() {
        assert_eq!(scan("1 2 \\ this is gone\n3"), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_backslash_inside_quote_kept() {
        assert_eq!(scan(".\" a \\ b\""), vec![".\"", "a", "\\", "b\""]);
    }

    #[test]
    fn test_case_sensitive_mode() {
        let t = Tokenizer::new(false);
        assert_eq!(t.scan("dup Swap"), vec!["dup", "Swap"]);
    }

    #[test]
    fn test_colon_definition_assembled_across_lines() {
        let t = Tokenizer::new(true);
        let mut readers =
            vec![FileHandle::text(": sq\n  dup *\n;\n7 sq\n", Msg::new())];
        let toks = t.next_tokens(&mut readers).unwrap();
        assert_eq!(toks, vec![":", "SQ", "DUP", "*", ";"]);
        let toks = t.next_tokens(&mut readers).unwrap();
        assert_eq!(toks, vec!["7", "SQ"]);
    }

    #[test]
    fn test_reader_pops_at_eof() {
        let t = Tokenizer::new(true);
        let mut readers = vec![
            FileHandle::text("base\n", Msg::new()),
            FileHandle::text("1 2\n", Msg::new()),
        ];
        assert_eq!(t.next_tokens(&mut readers).unwrap(), vec!["1", "2"]);
        // nested source exhausted: empty vector, falls back to the lower one
        assert_eq!(t.next_tokens(&mut readers).unwrap(), Vec::<String>::new());
        assert_eq!(readers.len(), 1);
        assert_eq!(t.next_tokens(&mut readers).unwrap(), vec!["BASE"]);
        // the last reader's EOF ends all input
        assert!(t.next_tokens(&mut readers).is_none());
    }

    #[test]
    fn test_hex_prefix_survives_folding() {
        // 0x1f folds to 0X1F; the number lexer accepts either prefix
        assert_eq!(scan("0x1f"), vec!["0X1F"]);
    }
}
