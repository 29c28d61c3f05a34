//////////////////////////////////////////////////////////////////
/// Compiler and Interpreter
///
/// The two-mode token processor. In interpret mode a token is a prefix word,
/// a number under the current BASE, a defining word to instantiate, or a
/// dictionary word to invoke. In compile mode (between `:` and `;`) tokens
/// grow the tree of the definition in progress; structural tokens switch the
/// compile target between branch composites, matched through the structural
/// stack. A definition is only inserted into the dictionary when `;`
/// completes; any error in between abandons it.
///
use lazy_static::lazy_static;
use regex::Regex;

use crate::engine::ForthEngine;
use crate::errors::{fault, ForthError, Structure};
use crate::internals::words::{
    encode_addr, DictEntry, Frame, LoopKind, NodeId, Opener, Pending, WordNode,
};
use crate::kernel::{Cell, STRUCT_CELLS};

lazy_static! {
    static ref DEC_INT: Regex = Regex::new(r"^[+-]?[0-9]+$").unwrap();
    static ref HEX_INT: Regex = Regex::new(r"^[+-]?[0-9A-Fa-f]+$").unwrap();
    static ref OCT_INT: Regex = Regex::new(r"^[+-]?[0-7]+$").unwrap();
    static ref BIN_INT: Regex = Regex::new(r"^[+-]?[01]+$").unwrap();
    static ref PREFIXED_HEX: Regex = Regex::new(r"^[+-]?0[xX][0-9A-Fa-f]+$").unwrap();
    static ref FLOAT_NUM: Regex =
        Regex::new(r"^[+-]?([0-9]+\.[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?$").unwrap();
}

/// Read cursor over one logical line's tokens. Prefix words and string
/// openers consume further tokens through it.
pub struct Cursor<'a> {
    tokens: &'a [String],
    index: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a [String]) -> Cursor<'a> {
        Cursor { tokens, index: 0 }
    }

    pub fn next(&mut self) -> Option<&'a String> {
        let tok = self.tokens.get(self.index);
        self.index += 1;
        tok
    }
}

fn need_token<'a>(cur: &mut Cursor<'a>, word: &str) -> Result<&'a String, ForthError> {
    cur.next().ok_or_else(|| ForthError::UnknownWord(format!("{word} (missing name)")))
}

/// Collect tokens up to one ending in `"`, rejoined with single blanks.
fn gather_quote(cur: &mut Cursor) -> Result<String, ForthError> {
    let mut parts: Vec<String> = Vec::new();
    while let Some(tok) = cur.next() {
        match tok.strip_suffix('"') {
            Some(stripped) => {
                parts.push(stripped.to_string());
                return Ok(parts.join(" "));
            }
            None => parts.push(tok.clone()),
        }
    }
    Err(ForthError::UnterminatedQuote)
}

/// Collect tokens up to one ending in `)`.
fn gather_comment(cur: &mut Cursor) -> Result<String, ForthError> {
    let mut parts: Vec<String> = Vec::new();
    while let Some(tok) = cur.next() {
        match tok.strip_suffix(')') {
            Some(stripped) => {
                if !stripped.is_empty() {
                    parts.push(stripped.to_string());
                }
                return Ok(parts.join(" "));
            }
            None => parts.push(tok.clone()),
        }
    }
    Err(ForthError::UnterminatedParen)
}

impl ForthEngine {
    /// Process one logical line of tokens.
    pub fn eval_tokens(&mut self, tokens: &[String]) -> Result<(), ForthError> {
        let mut cur = Cursor::new(tokens);
        while let Some(tok) = cur.next() {
            if self.compiling() {
                self.compile_token(tok, &mut cur)?;
            } else {
                self.interpret_token(tok, &mut cur)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // interpret mode
    // ------------------------------------------------------------------

    fn interpret_token(&mut self, token: &str, cur: &mut Cursor) -> Result<(), ForthError> {
        match token {
            ":" => {
                match cur.next() {
                    Some(name) => self.start_definition(name),
                    // name arrives with the next input line
                    None => self.pending = Some(Pending::awaiting_name()),
                }
                Ok(())
            }
            "(" => {
                gather_comment(cur)?;
                Ok(())
            }
            "'" => {
                let name = need_token(cur, "'")?;
                match self.dict.lookup(name) {
                    Some(entry) => {
                        let xt = Cell::from_int(entry.node as i64);
                        self.data.push(xt).map_err(|f| fault("'", f))?;
                        Ok(())
                    }
                    None => Err(ForthError::UnknownWord(name.clone())),
                }
            }
            "FIND" => {
                let name = need_token(cur, "FIND")?;
                let xt = self.dict.lookup(name).map(|e| e.node as i64).unwrap_or(0);
                self.data.push(Cell::from_int(xt)).map_err(|f| fault("FIND", f))?;
                Ok(())
            }
            "TO" => {
                let name = need_token(cur, "TO")?.clone();
                self.store_to(&name)
            }
            "CHAR" => {
                let tok = need_token(cur, "CHAR")?;
                let c = Cell::from_char(tok.as_bytes()[0]);
                self.data.push(c).map_err(|f| fault("CHAR", f))?;
                Ok(())
            }
            "CREATE" => {
                // interpret-mode CREATE also names the buffer
                let name = need_token(cur, "CREATE")?.clone();
                let buf = self.repo.append_create_buffer();
                self.insert_entry(&name, DictEntry::new(buf));
                Ok(())
            }
            ",\"" => {
                let text = gather_quote(cur)?;
                let buf = self.latest_buffer_mut(",\"")?;
                buf.push(text.len() as u8);
                buf.extend_from_slice(text.as_bytes());
                Ok(())
            }
            ".\"" => {
                let text = gather_quote(cur)?;
                self.emit_str(&text);
                Ok(())
            }
            "S\"" => {
                let text = gather_quote(cur)?;
                let len = text.len();
                let buf = self.repo.append(WordNode::Buffer(text.into_bytes()));
                self.data.push(encode_addr(buf, 0)).map_err(|f| fault("S\"", f))?;
                self.data.push(Cell::from_int(len as i64)).map_err(|f| fault("S\"", f))?;
                Ok(())
            }
            "C\"" => {
                let text = gather_quote(cur)?;
                let mut bytes = vec![text.len() as u8];
                bytes.extend_from_slice(text.as_bytes());
                let buf = self.repo.append(WordNode::Buffer(bytes));
                self.data.push(encode_addr(buf, 0)).map_err(|f| fault("C\"", f))?;
                Ok(())
            }
            "ABORT\"" => {
                let text = gather_quote(cur)?;
                let flag = self.data.pop().map_err(|f| fault("ABORT\"", f))?;
                if flag.is_true() {
                    Err(ForthError::Abort(text))
                } else {
                    Ok(())
                }
            }
            // compile-only tokens are not meaningful here
            ";" | "IF" | "ELSE" | "THEN" | "DO" | "LOOP" | "+LOOP" | "I" | "J" | "BEGIN"
            | "AGAIN" | "UNTIL" | "WHILE" | "REPEAT" | "EXIT" | "CASE" | "OF" | "ENDOF"
            | "ENDCASE" | "[" | "]" | "[']" | "[CHAR]" | "POSTPONE" | "LITERAL" | "DOES>" => {
                Err(ForthError::Unmatched(Structure::Interspersed))
            }
            _ => self.interpret_word_or_number(token, cur),
        }
    }

    /// Dictionary words win over numbers, so DEC still switches the radix
    /// when BASE is 16 even though D, E, C are hex digits.
    fn interpret_word_or_number(&mut self, token: &str, cur: &mut Cursor) -> Result<(), ForthError> {
        if let Some(entry) = self.dict.lookup(token) {
            let node = entry.node;
            if entry.defining && self.defining_shape(node).is_some() {
                return self.instantiate_defining(token, node, cur);
            }
            self.invoke(node)?; // a stray LEAVE at top level is a no-op
            return Ok(());
        }
        if let Some(v) = self.parse_int(token)? {
            self.data.push(Cell::from_int(v)).map_err(|f| fault(token, f))?;
            return Ok(());
        }
        if let Some(v) = self.parse_float(token)? {
            self.data.push(Cell::from_float(v)).map_err(|f| fault(token, f))?;
            return Ok(());
        }
        Err(ForthError::UnknownWord(token.to_string()))
    }

    /// A defining word's body is exactly one DOES node.
    fn defining_shape(&self, root: NodeId) -> Option<(NodeId, NodeId)> {
        if self.repo.child_count(root) != 1 {
            return None;
        }
        let only = self.repo.child_at(root, 0)?;
        match self.repo.get(only) {
            WordNode::Does { behaviour, .. } => Some((only, *behaviour)),
            _ => None,
        }
    }

    /// Invoke a defining word: run its creation branch (which must CREATE a
    /// buffer), then install `[buffer, behaviour]` under the next token.
    fn instantiate_defining(
        &mut self,
        word: &str,
        root: NodeId,
        cur: &mut Cursor,
    ) -> Result<(), ForthError> {
        let (does, behaviour) = match self.defining_shape(root) {
            Some(shape) => shape,
            None => return Err(ForthError::MissingCreate { word: word.to_string() }),
        };
        let before = self.repo.len();
        self.invoke(does)?;
        let buf = match self.repo.latest_buffer() {
            Some(b) if b >= before => b,
            _ => return Err(ForthError::MissingCreate { word: word.to_string() }),
        };
        let name = need_token(cur, word)?.clone();
        let comp = self.repo.new_composite();
        self.repo.push_child(comp, buf);
        self.repo.push_child(comp, behaviour);
        self.insert_entry(&name, DictEntry::new(comp));
        Ok(())
    }

    /// TO <name>: store the top of stack into the word's backing buffer.
    fn store_to(&mut self, name: &str) -> Result<(), ForthError> {
        let node = match self.dict.lookup(name) {
            Some(entry) => entry.node,
            None => return Err(ForthError::UndefinedValue { name: name.to_string() }),
        };
        let buf = match self.repo.get(node) {
            WordNode::Buffer(_) => Some(node),
            WordNode::Composite(_) => match self.repo.child_at(node, 0) {
                Some(first) => match self.repo.get(first) {
                    WordNode::Buffer(_) => Some(first),
                    _ => None,
                },
                None => None,
            },
            _ => None,
        };
        let buf = buf.ok_or(ForthError::UndefinedValue { name: name.to_string() })?;
        let val = self.data.pop().map_err(|f| fault("TO", f))?;
        self.write_cell_at("TO", encode_addr(buf, 0), val)
    }

    // ------------------------------------------------------------------
    // compile mode
    // ------------------------------------------------------------------

    fn compile_token(&mut self, token: &str, cur: &mut Cursor) -> Result<(), ForthError> {
        if self.pending.as_ref().map(|p| p.await_name).unwrap_or(false) {
            self.start_definition(token);
            return Ok(());
        }
        match token {
            ";" => self.finish_definition(),
            "(" => {
                let text = gather_comment(cur)?;
                if let Some(p) = &mut self.pending {
                    if !p.comment.is_empty() {
                        p.comment.push(' ');
                    }
                    p.comment.push_str(&text);
                }
                Ok(())
            }
            "[" => {
                self.all_immediate = true;
                Ok(())
            }
            "]" => {
                self.all_immediate = false;
                Ok(())
            }
            "IF" => self.c_if(),
            "ELSE" => self.c_else(),
            "THEN" => self.c_then(),
            "DO" => self.c_do(),
            "LOOP" => self.c_loop(),
            "+LOOP" => self.close_do(),
            "I" => self.c_loop_index(0),
            "J" => self.c_loop_index(1),
            "BEGIN" => self.c_begin(),
            "AGAIN" => self.c_begin_close(LoopKind::Again, Structure::BeginAgain),
            "UNTIL" => self.c_begin_close(LoopKind::Until, Structure::BeginUntil),
            "WHILE" => self.c_while(),
            "REPEAT" => self.c_repeat(),
            "EXIT" => self.c_exit(),
            "CASE" => self.c_case(),
            "OF" => self.c_of(),
            "ENDOF" => self.c_endof(),
            "ENDCASE" => self.c_endcase(),
            "DOES>" => self.c_does(),
            "POSTPONE" => {
                let name = need_token(cur, "POSTPONE")?;
                let bound = match self.dict.lookup(name) {
                    Some(entry) => entry.node,
                    None => return Err(ForthError::UnknownWord(name.clone())),
                };
                let node = self.repo.append(WordNode::Postpone(bound));
                self.append_to_target(node);
                Ok(())
            }
            "LITERAL" => {
                let val = self.data.pop().map_err(|f| fault("LITERAL", f))?;
                let node = self.repo.append(WordNode::Literal(val));
                self.append_to_target(node);
                Ok(())
            }
            "[']" => {
                let name = need_token(cur, "[']")?;
                let bound = match self.dict.lookup(name) {
                    Some(entry) => entry.node,
                    None => return Err(ForthError::UnknownWord(name.clone())),
                };
                let node = self.repo.append(WordNode::Literal(Cell::from_int(bound as i64)));
                self.append_to_target(node);
                Ok(())
            }
            "[CHAR]" => {
                let tok = need_token(cur, "[CHAR]")?;
                let node =
                    self.repo.append(WordNode::Literal(Cell::from_char(tok.as_bytes()[0])));
                self.append_to_target(node);
                Ok(())
            }
            ".\"" => {
                let text = gather_quote(cur)?;
                if self.all_immediate {
                    self.emit_str(&text);
                } else {
                    let node = self.repo.append(WordNode::DotQuote(text));
                    self.append_to_target(node);
                }
                Ok(())
            }
            "S\"" => {
                let text = gather_quote(cur)?;
                let len = text.len();
                let buf = self.repo.append(WordNode::Buffer(text.into_bytes()));
                if self.all_immediate {
                    self.data.push(encode_addr(buf, 0)).map_err(|f| fault("S\"", f))?;
                    self.data.push(Cell::from_int(len as i64)).map_err(|f| fault("S\"", f))?;
                } else {
                    let node = self.repo.append(WordNode::SQuote { buf, len });
                    self.append_to_target(node);
                }
                Ok(())
            }
            "C\"" => {
                let text = gather_quote(cur)?;
                let mut bytes = vec![text.len() as u8];
                bytes.extend_from_slice(text.as_bytes());
                let buf = self.repo.append(WordNode::Buffer(bytes));
                if self.all_immediate {
                    self.data.push(encode_addr(buf, 0)).map_err(|f| fault("C\"", f))?;
                } else {
                    let node = self.repo.append(WordNode::CQuote { buf });
                    self.append_to_target(node);
                }
                Ok(())
            }
            "ABORT\"" => {
                let text = gather_quote(cur)?;
                let node = self.repo.append(WordNode::AbortQuote(text));
                self.append_to_target(node);
                Ok(())
            }
            ",\"" => {
                let text = gather_quote(cur)?;
                if self.all_immediate {
                    let buf = self.latest_buffer_mut(",\"")?;
                    buf.push(text.len() as u8);
                    buf.extend_from_slice(text.as_bytes());
                } else {
                    let node = self.repo.append(WordNode::CommaQuote(text));
                    self.append_to_target(node);
                }
                Ok(())
            }
            _ => {
                if let Some(entry) = self.dict.lookup(token) {
                    let node = entry.node;
                    if entry.immediate || self.all_immediate {
                        self.invoke(node)?;
                    } else {
                        self.append_to_target(node);
                    }
                    return Ok(());
                }
                if let Some(v) = self.parse_int(token)? {
                    return self.compile_cell(Cell::from_int(v));
                }
                if let Some(v) = self.parse_float(token)? {
                    return self.compile_cell(Cell::from_float(v));
                }
                Err(ForthError::UnknownWord(token.to_string()))
            }
        }
    }

    fn start_definition(&mut self, name: &str) {
        let root = self.repo.new_composite();
        self.pending = Some(Pending {
            name: name.to_string(),
            root,
            target: root,
            comment: String::new(),
            does_seen: false,
            await_name: false,
        });
    }

    /// `;` - close the definition and insert it. The entry only now becomes
    /// visible, so a body naming its own word still calls the previous one.
    fn finish_definition(&mut self) -> Result<(), ForthError> {
        if let Some(frame) = self.structural.last() {
            let which = match frame.opener {
                Opener::If(_) => Structure::IfThen,
                Opener::Do(_) => Structure::DoLoop,
                Opener::Begin(node) => match self.begin_kind(node) {
                    LoopKind::WhileRepeat => Structure::BeginWhileRepeat,
                    LoopKind::Until => Structure::BeginUntil,
                    _ => Structure::BeginAgain,
                },
                Opener::Case(_) => Structure::CaseEndcase,
            };
            return Err(ForthError::Unmatched(which));
        }
        let p = self.pending.take().ok_or(ForthError::Unmatched(Structure::Interspersed))?;
        if p.await_name {
            return Err(ForthError::Unmatched(Structure::Interspersed));
        }
        let mut entry = DictEntry::new(p.root);
        entry.defining = p.does_seen;
        entry.comment = p.comment;
        self.insert_entry(&p.name, entry);
        self.msg.debug("compiler", "Defined word", Some(&p.name));
        self.all_immediate = false;
        Ok(())
    }

    pub fn insert_entry(&mut self, name: &str, entry: DictEntry) {
        if self.dict.lookup(name).is_some() {
            self.msg.warning("?unique", "Overwriting existing definition", Some(name));
        }
        self.dict.insert(name, entry);
    }

    // ---- compile-target plumbing ----

    fn target(&self) -> Result<NodeId, ForthError> {
        self.pending
            .as_ref()
            .map(|p| p.target)
            .ok_or(ForthError::Unmatched(Structure::Interspersed))
    }

    fn set_target(&mut self, target: NodeId) {
        if let Some(p) = &mut self.pending {
            p.target = target;
        }
    }

    fn append_to_target(&mut self, node: NodeId) {
        if let Some(p) = &self.pending {
            let target = p.target;
            self.repo.push_child(target, node);
        }
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), ForthError> {
        if self.structural.len() >= STRUCT_CELLS {
            return Err(ForthError::StackOverflow { word: "control".to_string() });
        }
        self.structural.push(frame);
        Ok(())
    }

    fn if_false_branch(&self, node: NodeId) -> Option<NodeId> {
        match self.repo.get(node) {
            WordNode::If { false_branch, .. } => Some(*false_branch),
            _ => None,
        }
    }

    fn begin_while_body(&self, node: NodeId) -> Option<NodeId> {
        match self.repo.get(node) {
            WordNode::BeginLoop { while_body, .. } => Some(*while_body),
            _ => None,
        }
    }

    fn lookup_node(&self, name: &str) -> Result<NodeId, ForthError> {
        self.dict
            .lookup(name)
            .map(|e| e.node)
            .ok_or_else(|| ForthError::UnknownWord(name.to_string()))
    }

    // ---- structural tokens ----

    fn c_if(&mut self) -> Result<(), ForthError> {
        let context = self.target()?;
        let true_branch = self.repo.new_composite();
        let false_branch = self.repo.new_composite();
        let node = self.repo.append(WordNode::If { true_branch, false_branch });
        self.repo.push_child(context, node);
        self.push_frame(Frame { context, opener: Opener::If(node) })?;
        self.set_target(true_branch);
        Ok(())
    }

    fn c_else(&mut self) -> Result<(), ForthError> {
        match self.structural.last() {
            Some(Frame { opener: Opener::If(node), .. }) => {
                let node = *node;
                let false_branch =
                    self.if_false_branch(node).ok_or(ForthError::Unmatched(Structure::IfThen))?;
                self.set_target(false_branch);
                Ok(())
            }
            _ => Err(ForthError::Unmatched(Structure::IfThen)),
        }
    }

    fn c_then(&mut self) -> Result<(), ForthError> {
        match self.structural.pop() {
            Some(Frame { context, opener: Opener::If(_) }) => {
                self.set_target(context);
                Ok(())
            }
            _ => Err(ForthError::Unmatched(Structure::IfThen)),
        }
    }

    fn c_do(&mut self) -> Result<(), ForthError> {
        let context = self.target()?;
        let body = self.repo.new_composite();
        let node = self.repo.append(WordNode::DoLoop { body, index: 0, limit: 0 });
        self.repo.push_child(context, node);
        self.push_frame(Frame { context, opener: Opener::Do(node) })?;
        self.set_target(body);
        Ok(())
    }

    /// LOOP compiles an implicit +1 step; +LOOP uses whatever the body left.
    fn c_loop(&mut self) -> Result<(), ForthError> {
        let one = self.repo.append(WordNode::Literal(Cell::from_int(1)));
        self.append_to_target(one);
        self.close_do()
    }

    fn close_do(&mut self) -> Result<(), ForthError> {
        match self.structural.pop() {
            Some(Frame { context, opener: Opener::Do(_) }) => {
                self.set_target(context);
                Ok(())
            }
            _ => Err(ForthError::Unmatched(Structure::DoLoop)),
        }
    }

    /// I and J bind to their DO loop while compiling; there is no run-time
    /// search.
    fn c_loop_index(&mut self, depth: usize) -> Result<(), ForthError> {
        let mut seen = 0;
        let mut bound = None;
        for frame in self.structural.iter().rev() {
            if let Opener::Do(node) = frame.opener {
                if seen == depth {
                    bound = Some(node);
                    break;
                }
                seen += 1;
            }
        }
        let bound = bound.ok_or(ForthError::Unmatched(Structure::DoLoop))?;
        let node = self.repo.append(WordNode::LoopIndex(bound));
        self.append_to_target(node);
        Ok(())
    }

    fn c_begin(&mut self) -> Result<(), ForthError> {
        let context = self.target()?;
        let begin = self.repo.new_composite();
        let while_body = self.repo.new_composite();
        let node =
            self.repo.append(WordNode::BeginLoop { begin, while_body, kind: LoopKind::Again });
        self.repo.push_child(context, node);
        self.push_frame(Frame { context, opener: Opener::Begin(node) })?;
        self.set_target(begin);
        Ok(())
    }

    fn c_begin_close(&mut self, kind: LoopKind, which: Structure) -> Result<(), ForthError> {
        match self.structural.pop() {
            Some(Frame { context, opener: Opener::Begin(node) }) => {
                self.set_begin_kind(node, kind);
                self.set_target(context);
                Ok(())
            }
            _ => Err(ForthError::Unmatched(which)),
        }
    }

    /// WHILE switches to the while-body but leaves the frame for REPEAT.
    fn c_while(&mut self) -> Result<(), ForthError> {
        match self.structural.last() {
            Some(Frame { opener: Opener::Begin(node), .. }) => {
                let node = *node;
                self.set_begin_kind(node, LoopKind::WhileRepeat);
                let while_body = self
                    .begin_while_body(node)
                    .ok_or(ForthError::Unmatched(Structure::BeginWhileRepeat))?;
                self.set_target(while_body);
                Ok(())
            }
            _ => Err(ForthError::Unmatched(Structure::BeginWhileRepeat)),
        }
    }

    fn c_repeat(&mut self) -> Result<(), ForthError> {
        match self.structural.pop() {
            Some(Frame { context, opener: Opener::Begin(node) })
                if self.begin_kind(node) == LoopKind::WhileRepeat =>
            {
                self.set_target(context);
                Ok(())
            }
            _ => Err(ForthError::Unmatched(Structure::BeginWhileRepeat)),
        }
    }

    /// EXIT binds to the nearest enclosing BEGIN loop.
    fn c_exit(&mut self) -> Result<(), ForthError> {
        let mut bound = None;
        for frame in self.structural.iter().rev() {
            if let Opener::Begin(node) = frame.opener {
                bound = Some(node);
                break;
            }
        }
        let bound = bound.ok_or(ForthError::Unmatched(Structure::Interspersed))?;
        let node = self.repo.append(WordNode::ExitBegin(bound));
        self.append_to_target(node);
        Ok(())
    }

    fn c_case(&mut self) -> Result<(), ForthError> {
        let context = self.target()?;
        let case = self.repo.new_composite();
        self.repo.push_child(context, case);
        self.push_frame(Frame { context, opener: Opener::Case(case) })?;
        self.set_target(case);
        Ok(())
    }

    /// OF compiles OVER = IF with a DROP leading the match branch.
    fn c_of(&mut self) -> Result<(), ForthError> {
        let context = self.target()?;
        let over = self.lookup_node("OVER")?;
        let eq = self.lookup_node("=")?;
        let drop = self.lookup_node("DROP")?;
        self.repo.push_child(context, over);
        self.repo.push_child(context, eq);
        let true_branch = self.repo.new_composite();
        let false_branch = self.repo.new_composite();
        let node = self.repo.append(WordNode::If { true_branch, false_branch });
        self.repo.push_child(context, node);
        self.push_frame(Frame { context, opener: Opener::If(node) })?;
        self.repo.push_child(true_branch, drop);
        self.set_target(true_branch);
        Ok(())
    }

    /// ENDOF: the rest of the CASE compiles into the no-match branch.
    fn c_endof(&mut self) -> Result<(), ForthError> {
        match self.structural.last() {
            Some(Frame { opener: Opener::If(node), .. }) => {
                let node = *node;
                let false_branch = self
                    .if_false_branch(node)
                    .ok_or(ForthError::Unmatched(Structure::CaseEndcase))?;
                self.set_target(false_branch);
                Ok(())
            }
            _ => Err(ForthError::Unmatched(Structure::CaseEndcase)),
        }
    }

    /// ENDCASE: the innermost no-match branch drops the unmatched selector,
    /// then the frames unwind through the chained OFs to the CASE.
    fn c_endcase(&mut self) -> Result<(), ForthError> {
        let drop = self.lookup_node("DROP")?;
        match self.structural.pop() {
            Some(Frame { opener: Opener::If(node), .. }) => {
                let false_branch = self
                    .if_false_branch(node)
                    .ok_or(ForthError::Unmatched(Structure::CaseEndcase))?;
                self.repo.push_child(false_branch, drop);
                loop {
                    match self.structural.pop() {
                        Some(Frame { context, opener: Opener::Case(_) }) => {
                            self.set_target(context);
                            return Ok(());
                        }
                        Some(Frame { opener: Opener::If(_), .. }) => continue,
                        _ => return Err(ForthError::Unmatched(Structure::CaseEndcase)),
                    }
                }
            }
            Some(Frame { context, opener: Opener::Case(case) }) => {
                // no OF clauses; the selector is still consumed
                self.repo.push_child(case, drop);
                self.set_target(context);
                Ok(())
            }
            _ => Err(ForthError::Unmatched(Structure::CaseEndcase)),
        }
    }

    /// DOES> splits the definition: what is compiled so far becomes the
    /// creation branch, the rest goes to the behaviour branch.
    fn c_does(&mut self) -> Result<(), ForthError> {
        if !self.structural.is_empty() {
            return Err(ForthError::Unmatched(Structure::Interspersed));
        }
        let root = match &self.pending {
            Some(p) => p.root,
            None => return Err(ForthError::Unmatched(Structure::Interspersed)),
        };
        let children = match self.repo.get_mut(root) {
            WordNode::Composite(ch) => std::mem::take(ch),
            _ => Vec::new(),
        };
        let creation = self.repo.append(WordNode::Composite(children));
        let behaviour = self.repo.new_composite();
        let does = self.repo.append(WordNode::Does { creation, behaviour });
        self.repo.push_child(root, does);
        if let Some(p) = &mut self.pending {
            p.target = behaviour;
            p.does_seen = true;
        }
        Ok(())
    }

    // ---- numeric lexing ----

    fn compile_cell(&mut self, val: Cell) -> Result<(), ForthError> {
        if self.all_immediate {
            self.data.push(val).map_err(|f| fault("literal", f))?;
        } else {
            let node = self.repo.append(WordNode::Literal(val));
            self.append_to_target(node);
        }
        Ok(())
    }

    /// Integer under the current BASE; `0x` forces hex regardless of it.
    /// Magnitudes above i64::MAX reinterpret as the same 64 bits.
    pub(crate) fn parse_int(&self, token: &str) -> Result<Option<i64>, ForthError> {
        let (neg, body) = match token.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, token.strip_prefix('+').unwrap_or(token)),
        };
        let (digits, base) = if PREFIXED_HEX.is_match(token) {
            (&body[2..], 16)
        } else {
            let base = self.radix();
            let shaped = match base {
                16 => HEX_INT.is_match(token),
                8 => OCT_INT.is_match(token),
                2 => BIN_INT.is_match(token),
                _ => DEC_INT.is_match(token),
            };
            if !shaped {
                return Ok(None);
            }
            (body, base)
        };
        let mag = u64::from_str_radix(digits, base)
            .map_err(|_| ForthError::BadLiteral(token.to_string()))?;
        let val = if neg {
            if mag > 1u64 << 63 {
                return Err(ForthError::BadLiteral(token.to_string()));
            }
            (mag as i64).wrapping_neg()
        } else {
            mag as i64
        };
        Ok(Some(val))
    }

    /// Floats must contain a `.`; the base is never inferred from a suffix.
    pub(crate) fn parse_float(&self, token: &str) -> Result<Option<f64>, ForthError> {
        if !FLOAT_NUM.is_match(token) {
            return Ok(None);
        }
        token
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ForthError::BadLiteral(token.to_string()))
    }
}
