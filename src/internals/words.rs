//////////////////////////////////////////////////////////////////
/// Word Graph
///
/// Every executable unit in the system is a WordNode. Nodes live in the
/// Repository, an append-only arena; references between nodes (a composite's
/// children, an I binding to its DO, a POSTPONE target) are plain NodeId
/// indices, so the arena is the single owner and nothing is ever freed.
/// Redefining a word just points the dictionary at a new node; bodies
/// compiled earlier keep the old index, which stays valid. That is also why
/// a word being compiled cannot call its new self: the name is only inserted
/// once `;` completes.
///
use crate::errors::ForthError;
use crate::kernel::Cell;
use rustc_hash::FxHashMap;

pub type NodeId = usize;

/// Result of one word invocation. Leave unwinds to the nearest loop, which
/// converts it back to Continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Leave,
}

pub type Step = Result<Flow, ForthError>;

/// Continuation rule of a BEGIN loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Again,
    Until,
    WhileRepeat,
    Exit,
}

#[derive(Debug)]
pub enum WordNode {
    /// Index into the engine's builtin table.
    Primitive(usize),
    /// Pushes a fixed cell: integer, float, char or address.
    Literal(Cell),
    /// `." text"` - writes its text to the output stream.
    DotQuote(String),
    /// `S" text"` - pushes the backing buffer's address, then the length.
    SQuote { buf: NodeId, len: usize },
    /// `C" text"` - pushes the address of a counted string buffer.
    CQuote { buf: NodeId },
    /// `ABORT" text"` - pops a flag; aborts with the text when it is true.
    AbortQuote(String),
    /// `," text"` - appends its text as a counted string to the newest buffer.
    CommaQuote(String),
    /// A growable raw-byte buffer; invoking it pushes the base address.
    Buffer(Vec<u8>),
    /// An ordered sequence of words, invoked in order.
    Composite(Vec<NodeId>),
    /// Pops a flag and runs one of two branch composites.
    If { true_branch: NodeId, false_branch: NodeId },
    /// Counted loop. index and limit are set at each invocation.
    DoLoop { body: NodeId, index: i64, limit: i64 },
    /// I or J: pushes the current index of its bound DO loop.
    LoopIndex(NodeId),
    /// BEGIN loop; the kind decides how each pass continues.
    BeginLoop { begin: NodeId, while_body: NodeId, kind: LoopKind },
    /// Flips its bound BEGIN loop's kind to Exit.
    ExitBegin(NodeId),
    /// A defining word's split body: creation branch and behaviour branch.
    Does { creation: NodeId, behaviour: NodeId },
    /// Compiles its bound word into the definition in progress.
    Postpone(NodeId),
}

/// Append-only owner of every word node.
///
/// The buffer most recently appended through CREATE is the target of `,`
/// `C,` `,"` and ALLOT until the next CREATE. Buffers backing string
/// literals go in through plain append and never become that target.
pub struct Repository {
    nodes: Vec<WordNode>,
    latest_buffer: Option<NodeId>,
}

impl Repository {
    pub fn new() -> Repository {
        Repository { nodes: Vec::new(), latest_buffer: None }
    }

    pub fn append(&mut self, node: WordNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// CREATE's allocation: an empty buffer that becomes the comma target.
    pub fn append_create_buffer(&mut self) -> NodeId {
        let id = self.append(WordNode::Buffer(Vec::new()));
        self.latest_buffer = Some(id);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> &WordNode {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut WordNode {
        &mut self.nodes[id]
    }

    pub fn node(&self, id: NodeId) -> Option<&WordNode> {
        self.nodes.get(id)
    }

    pub fn latest_buffer(&self) -> Option<NodeId> {
        self.latest_buffer
    }

    pub fn new_composite(&mut self) -> NodeId {
        self.append(WordNode::Composite(Vec::new()))
    }

    /// Append a child to a composite node.
    pub fn push_child(&mut self, comp: NodeId, child: NodeId) {
        if let WordNode::Composite(children) = self.get_mut(comp) {
            children.push(child);
        }
    }

    pub fn child_count(&self, comp: NodeId) -> usize {
        match self.get(comp) {
            WordNode::Composite(children) => children.len(),
            _ => 0,
        }
    }

    pub fn child_at(&self, comp: NodeId, i: usize) -> Option<NodeId> {
        match self.get(comp) {
            WordNode::Composite(children) => children.get(i).copied(),
            _ => None,
        }
    }

    pub fn buffer(&self, id: NodeId) -> Option<&Vec<u8>> {
        match self.node(id) {
            Some(WordNode::Buffer(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn buffer_mut(&mut self, id: NodeId) -> Option<&mut Vec<u8>> {
        match self.nodes.get_mut(id) {
            Some(WordNode::Buffer(bytes)) => Some(bytes),
            _ => None,
        }
    }
}

// Buffer addresses are cells with the owning node in the high half and the
// byte offset in the low half, so address arithmetic (CELL+, +) moves the
// offset. Every dereference re-validates both parts.

pub fn encode_addr(node: NodeId, offset: usize) -> Cell {
    Cell::from_uint(((node as u64) << 32) | (offset as u64 & 0xFFFF_FFFF))
}

pub fn decode_addr(cell: Cell) -> (NodeId, usize) {
    let raw = cell.to_uint();
    ((raw >> 32) as usize, (raw & 0xFFFF_FFFF) as usize)
}

/// One dictionary entry. Owns (by NodeId) the root of the word it names.
#[derive(Debug, Clone)]
pub struct DictEntry {
    pub node: NodeId,
    pub immediate: bool,
    pub compiling: bool,
    pub defining: bool,
    pub comment: String,
}

impl DictEntry {
    pub fn new(node: NodeId) -> DictEntry {
        DictEntry {
            node,
            immediate: false,
            compiling: false,
            defining: false,
            comment: String::new(),
        }
    }
}

/// The name-to-word mapping. Case-sensitive; the tokenizer folds case before
/// lookups ever happen. Last definition wins.
pub struct Dictionary {
    map: FxHashMap<String, DictEntry>,
    last_inserted: Option<String>,
}

impl Dictionary {
    pub fn new() -> Dictionary {
        Dictionary { map: FxHashMap::default(), last_inserted: None }
    }

    pub fn lookup(&self, name: &str) -> Option<&DictEntry> {
        self.map.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut DictEntry> {
        self.map.get_mut(name)
    }

    /// Insert an entry, returning true when it overwrote a previous one.
    pub fn insert(&mut self, name: &str, entry: DictEntry) -> bool {
        self.last_inserted = Some(name.to_string());
        self.map.insert(name.to_string(), entry).is_some()
    }

    /// Name of the most recent insertion, for IMMEDIATE.
    pub fn last_inserted(&self) -> Option<&str> {
        self.last_inserted.as_deref()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Alphabetical listing for WORDS.
    pub fn iter_sorted(&self) -> Vec<(&String, &DictEntry)> {
        let mut all: Vec<_> = self.map.iter().collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all
    }
}

/// What a structural-stack frame was opened by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opener {
    If(NodeId),
    Do(NodeId),
    Begin(NodeId),
    Case(NodeId),
}

/// Structural-stack frame: the composite that was the compile target when
/// the opener was seen, plus the opener itself.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub context: NodeId,
    pub opener: Opener,
}

/// A colon definition under construction. It is only inserted into the
/// dictionary when `;` is reached; an error in between abandons it.
pub struct Pending {
    pub name: String,
    pub root: NodeId,
    pub target: NodeId,
    pub comment: String,
    pub does_seen: bool,
    pub await_name: bool,
}

impl Pending {
    pub fn awaiting_name() -> Pending {
        Pending {
            name: String::new(),
            root: 0,
            target: 0,
            comment: String::new(),
            does_seen: false,
            await_name: true,
        }
    }
}

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_append_and_get() {
        let mut repo = Repository::new();
        let a = repo.append(WordNode::Literal(Cell::from_int(5)));
        let b = repo.new_composite();
        repo.push_child(b, a);
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.child_count(b), 1);
        assert_eq!(repo.child_at(b, 0), Some(a));
        assert_eq!(repo.child_at(b, 1), None);
    }

    #[test]
    fn test_latest_buffer_tracking() {
        let mut repo = Repository::new();
        assert_eq!(repo.latest_buffer(), None);
        let b1 = repo.append_create_buffer();
        repo.append(WordNode::Literal(Cell::from_int(1)));
        assert_eq!(repo.latest_buffer(), Some(b1));
        let b2 = repo.append_create_buffer();
        assert_eq!(repo.latest_buffer(), Some(b2));
        // a string-literal buffer does not steal the comma target
        let s = repo.append(WordNode::Buffer(vec![1, 2]));
        assert_eq!(repo.latest_buffer(), Some(b2));
        assert_eq!(repo.buffer(s).unwrap().len(), 2);
    }

    #[test]
    fn test_addr_encode_decode() {
        let c = encode_addr(7, 24);
        assert_eq!(decode_addr(c), (7, 24));
        // offset arithmetic moves only the low half
        let moved = Cell::from_int(c.to_int() + 8);
        assert_eq!(decode_addr(moved), (7, 32));
    }

    #[test]
    fn test_dictionary_insert_and_overwrite() {
        let mut dict = Dictionary::new();
        assert!(!dict.insert("SQ", DictEntry::new(1)));
        assert_eq!(dict.lookup("SQ").unwrap().node, 1);
        // last definition wins, old node id is simply replaced
        assert!(dict.insert("SQ", DictEntry::new(9)));
        assert_eq!(dict.lookup("SQ").unwrap().node, 9);
        assert_eq!(dict.last_inserted(), Some("SQ"));
    }

    #[test]
    fn test_dictionary_case_sensitive() {
        let mut dict = Dictionary::new();
        dict.insert("DUP", DictEntry::new(3));
        assert!(dict.lookup("dup").is_none());
        assert!(dict.lookup("DUP").is_some());
    }

    #[test]
    fn test_iter_sorted() {
        let mut dict = Dictionary::new();
        dict.insert("SWAP", DictEntry::new(1));
        dict.insert("DROP", DictEntry::new(2));
        dict.insert("ROT", DictEntry::new(3));
        let names: Vec<&str> = dict.iter_sorted().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["DROP", "ROT", "SWAP"]);
    }
}
