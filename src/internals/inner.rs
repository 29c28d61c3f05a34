/// Inner Interpreters
///
/// Core functions to execute each word-node variant. Execution is a
/// depth-first walk of the word graph: composites invoke their children in
/// order, structural nodes decide which branch composite runs and how often.
/// A LEAVE surfaces as Flow::Leave and unwinds through composites untouched;
/// the nearest DO or BEGIN loop converts it back into Flow::Continue.
///
use crate::engine::ForthEngine;
use crate::errors::{fault, ForthError, Structure};
use crate::internals::words::{encode_addr, Flow, LoopKind, NodeId, Step, WordNode};
use crate::kernel::Cell;

impl ForthEngine {
    /// Invoke one node. The match on the node tag replaces the virtual
    /// dispatch a class hierarchy would use.
    pub fn invoke(&mut self, id: NodeId) -> Step {
        match self.repo.get(id) {
            WordNode::Primitive(i) => {
                let index = *i;
                let code = self.builtins[index].code;
                code(self)
            }
            WordNode::Literal(c) => {
                let val = *c;
                self.data.push(val).map_err(|f| fault("literal", f))?;
                Ok(Flow::Continue)
            }
            WordNode::DotQuote(s) => {
                let text = s.clone();
                self.emit_str(&text);
                Ok(Flow::Continue)
            }
            WordNode::SQuote { buf, len } => {
                let (buf, len) = (*buf, *len);
                self.data.push(encode_addr(buf, 0)).map_err(|f| fault("S\"", f))?;
                self.data.push(Cell::from_int(len as i64)).map_err(|f| fault("S\"", f))?;
                Ok(Flow::Continue)
            }
            WordNode::CQuote { buf } => {
                let buf = *buf;
                self.data.push(encode_addr(buf, 0)).map_err(|f| fault("C\"", f))?;
                Ok(Flow::Continue)
            }
            WordNode::AbortQuote(s) => {
                let text = s.clone();
                let flag = self.data.pop().map_err(|f| fault("ABORT\"", f))?;
                if flag.is_true() {
                    Err(ForthError::Abort(text))
                } else {
                    Ok(Flow::Continue)
                }
            }
            WordNode::CommaQuote(s) => {
                let text = s.clone();
                let buf = self.latest_buffer_mut(",\"")?;
                buf.push(text.len() as u8);
                buf.extend_from_slice(text.as_bytes());
                Ok(Flow::Continue)
            }
            WordNode::Buffer(_) => {
                self.data.push(encode_addr(id, 0)).map_err(|f| fault("buffer", f))?;
                Ok(Flow::Continue)
            }
            WordNode::Composite(_) => self.run_composite(id),
            WordNode::If { true_branch, false_branch } => {
                let (t, f) = (*true_branch, *false_branch);
                let flag = self.data.pop().map_err(|e| fault("IF", e))?;
                if flag.is_true() {
                    self.run_composite(t)
                } else {
                    self.run_composite(f)
                }
            }
            WordNode::DoLoop { body, .. } => {
                let body = *body;
                self.run_do_loop(id, body)
            }
            WordNode::LoopIndex(do_id) => {
                let bound = *do_id;
                let index = match self.repo.get(bound) {
                    WordNode::DoLoop { index, .. } => *index,
                    _ => return Err(ForthError::Unmatched(Structure::Interspersed)),
                };
                self.data.push(Cell::from_int(index)).map_err(|f| fault("I", f))?;
                Ok(Flow::Continue)
            }
            WordNode::BeginLoop { begin, while_body, kind } => {
                let (begin, while_body, entry_kind) = (*begin, *while_body, *kind);
                self.run_begin_loop(id, begin, while_body, entry_kind)
            }
            WordNode::ExitBegin(loop_id) => {
                let bound = *loop_id;
                self.set_begin_kind(bound, LoopKind::Exit);
                Ok(Flow::Continue)
            }
            WordNode::Does { creation, .. } => {
                // only the creation branch runs; the behaviour branch is
                // grafted into each word the defining word creates
                let creation = *creation;
                self.run_composite(creation)
            }
            WordNode::Postpone(word) => {
                let word = *word;
                match &self.pending {
                    Some(p) => {
                        let target = p.target;
                        self.repo.push_child(target, word);
                        Ok(Flow::Continue)
                    }
                    None => Err(ForthError::Unmatched(Structure::Interspersed)),
                }
            }
        }
    }

    /// Invoke a composite's children in order, one fetch per step so the
    /// repository can grow underneath.
    pub fn run_composite(&mut self, comp: NodeId) -> Step {
        let mut i = 0;
        while let Some(child) = self.repo.child_at(comp, i) {
            if self.invoke(child)? == Flow::Leave {
                return Ok(Flow::Leave);
            }
            i += 1;
        }
        Ok(Flow::Continue)
    }

    /// DO loop: pops initial then limit, runs the body until the step the
    /// body leaves on the stack carries the index past the limit. The body
    /// always runs at least once.
    fn run_do_loop(&mut self, node: NodeId, body: NodeId) -> Step {
        let initial = self.data.pop().map_err(|f| fault("DO", f))?.to_int();
        let limit = self.data.pop().map_err(|f| fault("DO", f))?.to_int();
        self.set_do_state(node, initial, limit);
        loop {
            if self.run_composite(body)? == Flow::Leave {
                break;
            }
            let step = self.data.pop().map_err(|f| fault("LOOP", f))?.to_int();
            assert!(step != 0, "zero step in DO loop");
            let index = self.do_index(node) + step;
            self.set_do_state(node, index, limit);
            let more = if step > 0 { index < limit } else { index >= limit };
            if !more {
                break;
            }
        }
        Ok(Flow::Continue)
    }

    /// BEGIN loop: the kind decides the continuation test. An EXIT in the
    /// body flips the kind to Exit; the compiled kind is put back when the
    /// loop unwinds so the word loops again next time it runs.
    fn run_begin_loop(
        &mut self,
        node: NodeId,
        begin: NodeId,
        while_body: NodeId,
        entry_kind: LoopKind,
    ) -> Step {
        let result = loop {
            match self.run_begin_pass(node, begin, while_body) {
                Ok(true) => continue,
                Ok(false) => break Ok(Flow::Continue),
                Err(e) => break Err(e),
            }
        };
        self.set_begin_kind(node, entry_kind);
        result
    }

    /// One pass of a BEGIN loop. Returns whether the loop continues.
    fn run_begin_pass(&mut self, node: NodeId, begin: NodeId, while_body: NodeId) -> Result<bool, ForthError> {
        if self.run_composite(begin)? == Flow::Leave {
            return Ok(false);
        }
        match self.begin_kind(node) {
            LoopKind::Exit => Ok(false),
            LoopKind::Again => Ok(true),
            LoopKind::Until => {
                let flag = self.data.pop().map_err(|f| fault("UNTIL", f))?;
                Ok(!flag.is_true())
            }
            LoopKind::WhileRepeat => {
                let flag = self.data.pop().map_err(|f| fault("WHILE", f))?;
                if !flag.is_true() {
                    return Ok(false);
                }
                if self.run_composite(while_body)? == Flow::Leave {
                    return Ok(false);
                }
                Ok(self.begin_kind(node) != LoopKind::Exit)
            }
        }
    }

    // ---- structural-node state accessors ----

    fn do_index(&self, node: NodeId) -> i64 {
        match self.repo.get(node) {
            WordNode::DoLoop { index, .. } => *index,
            _ => 0,
        }
    }

    fn set_do_state(&mut self, node: NodeId, new_index: i64, new_limit: i64) {
        if let WordNode::DoLoop { index, limit, .. } = self.repo.get_mut(node) {
            *index = new_index;
            *limit = new_limit;
        }
    }

    pub fn begin_kind(&self, node: NodeId) -> LoopKind {
        match self.repo.get(node) {
            WordNode::BeginLoop { kind, .. } => *kind,
            _ => LoopKind::Again,
        }
    }

    pub fn set_begin_kind(&mut self, node: NodeId, new_kind: LoopKind) {
        if let WordNode::BeginLoop { kind, .. } = self.repo.get_mut(node) {
            *kind = new_kind;
        }
    }
}

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ForthEngine {
        let mut e = ForthEngine::default();
        e.capture_output();
        e
    }

    fn lit(e: &mut ForthEngine, v: i64) -> NodeId {
        e.repo.append(WordNode::Literal(Cell::from_int(v)))
    }

    #[test]
    fn test_literal_pushes() {
        let mut e = engine();
        let n = lit(&mut e, 42);
        assert_eq!(e.invoke(n), Ok(Flow::Continue));
        assert_eq!(e.data.pop().unwrap().to_int(), 42);
    }

    #[test]
    fn test_composite_runs_in_order() {
        let mut e = engine();
        let a = lit(&mut e, 1);
        let b = lit(&mut e, 2);
        let comp = e.repo.new_composite();
        e.repo.push_child(comp, a);
        e.repo.push_child(comp, b);
        e.invoke(comp).unwrap();
        assert_eq!(e.data.pop().unwrap().to_int(), 2);
        assert_eq!(e.data.pop().unwrap().to_int(), 1);
    }

    #[test]
    fn test_if_selects_branch() {
        let mut e = engine();
        let t = e.repo.new_composite();
        let f = e.repo.new_composite();
        let ten = lit(&mut e, 10);
        let twenty = lit(&mut e, 20);
        e.repo.push_child(t, ten);
        e.repo.push_child(f, twenty);
        let node = e.repo.append(WordNode::If { true_branch: t, false_branch: f });

        e.data.push(Cell::from_int(0)).unwrap();
        e.invoke(node).unwrap();
        assert_eq!(e.data.pop().unwrap().to_int(), 20);

        e.data.push(Cell::from_int(7)).unwrap();
        e.invoke(node).unwrap();
        assert_eq!(e.data.pop().unwrap().to_int(), 10);
    }

    #[test]
    fn test_if_on_empty_stack_errors() {
        let mut e = engine();
        let t = e.repo.new_composite();
        let f = e.repo.new_composite();
        let node = e.repo.append(WordNode::If { true_branch: t, false_branch: f });
        assert_eq!(e.invoke(node), Err(ForthError::StackUnderflow { word: "IF".to_string() }));
    }

    #[test]
    fn test_do_loop_counts_indices() {
        let mut e = engine();
        let body = e.repo.new_composite();
        let node = e.repo.append(WordNode::DoLoop { body, index: 0, limit: 0 });
        let idx = e.repo.append(WordNode::LoopIndex(node));
        let step = lit(&mut e, 1);
        e.repo.push_child(body, idx);
        e.repo.push_child(body, step);

        // 4 0 DO I LOOP
        e.data.push(Cell::from_int(4)).unwrap();
        e.data.push(Cell::from_int(0)).unwrap();
        e.invoke(node).unwrap();
        let v: Vec<i64> = e.data.data().iter().map(|c| c.to_int()).collect();
        assert_eq!(v, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_do_loop_overshoot_runs_once() {
        let mut e = engine();
        let body = e.repo.new_composite();
        let node = e.repo.append(WordNode::DoLoop { body, index: 0, limit: 0 });
        let idx = e.repo.append(WordNode::LoopIndex(node));
        let step = lit(&mut e, 10);
        e.repo.push_child(body, idx);
        e.repo.push_child(body, step);

        // step passes the limit in one iteration; the body still ran once
        e.data.push(Cell::from_int(5)).unwrap();
        e.data.push(Cell::from_int(0)).unwrap();
        e.invoke(node).unwrap();
        assert_eq!(e.data.size(), 1);
        assert_eq!(e.data.pop().unwrap().to_int(), 0);
    }

    #[test]
    fn test_leave_breaks_do_loop() {
        let mut e = engine();
        fn f_leave(_e: &mut ForthEngine) -> Step {
            Ok(Flow::Leave)
        }
        let leave = e.add_builtin("LEAVE", f_leave, "");
        let body = e.repo.new_composite();
        let node = e.repo.append(WordNode::DoLoop { body, index: 0, limit: 0 });
        let marker = lit(&mut e, 77);
        e.repo.push_child(body, marker);
        e.repo.push_child(body, leave);

        e.data.push(Cell::from_int(100)).unwrap();
        e.data.push(Cell::from_int(0)).unwrap();
        assert_eq!(e.invoke(node), Ok(Flow::Continue)); // Leave is absorbed
        assert_eq!(e.data.size(), 1);
        assert_eq!(e.data.pop().unwrap().to_int(), 77);
    }

    #[test]
    fn test_begin_until_loops() {
        let mut e = engine();
        // BEGIN 1+ DUP 3 = UNTIL over a counter on the stack
        fn f_count(e: &mut ForthEngine) -> Step {
            let v = e.data.pop().unwrap().to_int() + 1;
            e.data.push(Cell::from_int(v)).unwrap();
            e.data.push(Cell::from_bool(v == 3)).unwrap();
            Ok(Flow::Continue)
        }
        let count = e.add_builtin("(COUNT)", f_count, "");
        let begin = e.repo.new_composite();
        let while_body = e.repo.new_composite();
        let node =
            e.repo.append(WordNode::BeginLoop { begin, while_body, kind: LoopKind::Until });
        e.repo.push_child(begin, count);

        e.data.push(Cell::from_int(0)).unwrap();
        e.invoke(node).unwrap();
        assert_eq!(e.data.pop().unwrap().to_int(), 3);
    }

    #[test]
    fn test_exit_begin_restores_kind() {
        let mut e = engine();
        let begin = e.repo.new_composite();
        let while_body = e.repo.new_composite();
        let node =
            e.repo.append(WordNode::BeginLoop { begin, while_body, kind: LoopKind::Again });
        let exit = e.repo.append(WordNode::ExitBegin(node));
        e.repo.push_child(begin, exit);

        // an AGAIN loop whose body EXITs terminates, and the compiled kind
        // survives for the next invocation
        e.invoke(node).unwrap();
        match e.repo.get(node) {
            WordNode::BeginLoop { kind, .. } => assert_eq!(*kind, LoopKind::Again),
            _ => panic!("node changed shape"),
        }
        e.invoke(node).unwrap();
    }

    #[test]
    fn test_buffer_pushes_base_address() {
        let mut e = engine();
        let buf = e.repo.append(WordNode::Buffer(vec![1, 2, 3, 4, 5, 6, 7, 8]));
        e.invoke(buf).unwrap();
        let addr = e.data.pop().unwrap();
        assert_eq!(crate::internals::words::decode_addr(addr), (buf, 0));
    }

    #[test]
    fn test_postpone_outside_compilation_errors() {
        let mut e = engine();
        let target = lit(&mut e, 1);
        let node = e.repo.append(WordNode::Postpone(target));
        assert_eq!(e.invoke(node), Err(ForthError::Unmatched(Structure::Interspersed)));
    }

    #[test]
    fn test_abort_quote_fires_on_true() {
        let mut e = engine();
        let node = e.repo.append(WordNode::AbortQuote("index out of range".to_string()));
        e.data.push(Cell::from_int(0)).unwrap();
        assert_eq!(e.invoke(node), Ok(Flow::Continue));
        e.data.push(Cell::from_int(1)).unwrap();
        assert_eq!(e.invoke(node), Err(ForthError::Abort("index out of range".to_string())));
    }
}
