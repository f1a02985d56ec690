//! Tolerant element scanner for HTML and SVG text.
//!
//! Produces a flat, document-ordered list of elements with byte spans into the
//! source, which is all the sprite assembler needs to select icons and splice
//! replacements. Malformed input never fails the scan; problems are collected
//! as issues.

/// HTML elements that never have content or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose content is not markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// One attribute as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// `None` for valueless attributes (`<svg hidden>`)
    pub value: Option<String>,
}

/// One element with its byte spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name
    pub name: String,
    pub attrs: Vec<Attribute>,
    /// Offset of `<`
    pub start: usize,
    /// Offset just after the opening tag's `>`
    pub open_end: usize,
    /// Offset of the closing tag (equals `open_end` when there is none)
    pub close_start: usize,
    /// Offset just after the element
    pub end: usize,
    /// Index of the enclosing element
    pub parent: Option<usize>,
}

impl Element {
    /// Attribute value by case-insensitive name. Valueless attributes yield "".
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_deref().unwrap_or(""))
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Whitespace-separated classes.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    /// Markup between the opening and closing tags.
    pub fn inner<'s>(&self, source: &'s str) -> &'s str {
        &source[self.open_end..self.close_start]
    }

    /// The whole element.
    pub fn outer<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start..self.end]
    }
}

/// Scanned document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub elements: Vec<Element>,
    /// Recoverable problems found while scanning
    pub issues: Vec<String>,
}

impl Document {
    /// Scan `source` into elements.
    pub fn parse(source: &str) -> Self {
        Scanner::new(source).run()
    }

    /// Indices of the descendants of `index`, in document order.
    pub fn descendants(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let end = self.elements[index].end;
        let open_end = self.elements[index].open_end;
        (index + 1..self.elements.len())
            .take_while(move |&j| self.elements[j].start < end)
            .filter(move |&j| self.elements[j].start >= open_end)
    }

    /// Whether `index` lies inside element `ancestor`.
    pub fn is_descendant(&self, index: usize, ancestor: usize) -> bool {
        let mut current = self.elements[index].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.elements[parent].parent;
        }
        false
    }
}

struct Scanner<'s> {
    src: &'s str,
    bytes: &'s [u8],
    pos: usize,
    doc: Document,
    /// Open elements, innermost last
    stack: Vec<usize>,
}

impl<'s> Scanner<'s> {
    fn new(src: &'s str) -> Self {
        Self { src, bytes: src.as_bytes(), pos: 0, doc: Document::default(), stack: Vec::new() }
    }

    fn run(mut self) -> Document {
        while let Some(offset) = self.src[self.pos..].find('<') {
            let at = self.pos + offset;
            self.pos = at;
            let rest = &self.src[at..];

            if rest.starts_with("<!--") {
                self.skip_past(at + 4, "-->", "unterminated comment");
            } else if rest.starts_with("<![CDATA[") {
                self.skip_past(at + 9, "]]>", "unterminated CDATA section");
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.skip_past(at + 2, ">", "unterminated declaration");
            } else if rest.starts_with("</") {
                self.close_tag(at);
            } else if rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                self.open_tag(at);
            } else {
                self.pos = at + 1;
            }
        }

        let len = self.src.len();
        while let Some(index) = self.stack.pop() {
            let name = self.doc.elements[index].name.clone();
            self.doc.issues.push(format!("unclosed <{}> at offset {}", name, self.doc.elements[index].start));
            self.doc.elements[index].close_start = len;
            self.doc.elements[index].end = len;
        }
        self.doc
    }

    fn skip_past(&mut self, from: usize, terminator: &str, issue: &str) {
        match self.src[from..].find(terminator) {
            Some(offset) => self.pos = from + offset + terminator.len(),
            None => {
                self.doc.issues.push(format!("{} at offset {}", issue, self.pos));
                self.pos = self.src.len();
            }
        }
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b.is_ascii_whitespace() || b == b'>' || b == b'/' || b == b'=' {
                break;
            }
            self.pos += 1;
        }
        self.src[start..self.pos].to_string()
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn open_tag(&mut self, at: usize) {
        self.pos = at + 1;
        let name = self.read_name().to_ascii_lowercase();
        let mut attrs = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            match self.bytes.get(self.pos) {
                None => {
                    self.doc.issues.push(format!("unterminated <{}> tag at offset {}", name, at));
                    return;
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'>') => {
                    self.pos += 2;
                    self_closing = true;
                    break;
                }
                Some(b'/') => self.pos += 1,
                Some(_) => {
                    let attr_name = self.read_name();
                    if attr_name.is_empty() {
                        // Stray '=' or similar; step over it.
                        self.pos += 1;
                        continue;
                    }
                    self.skip_whitespace();
                    let value = if self.bytes.get(self.pos) == Some(&b'=') {
                        self.pos += 1;
                        self.skip_whitespace();
                        Some(self.read_value())
                    } else {
                        None
                    };
                    attrs.push(Attribute { name: attr_name, value });
                }
            }
        }

        let open_end = self.pos;
        let index = self.doc.elements.len();
        let parent = self.stack.last().copied();
        self.doc.elements.push(Element {
            name: name.clone(),
            attrs,
            start: at,
            open_end,
            close_start: open_end,
            end: open_end,
            parent,
        });

        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            return;
        }

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            self.raw_text(index, &name);
        } else {
            self.stack.push(index);
        }
    }

    fn read_value(&mut self) -> String {
        match self.bytes.get(self.pos) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let start = self.pos + 1;
                match self.src[start..].find(quote as char) {
                    Some(offset) => {
                        self.pos = start + offset + 1;
                        self.src[start..start + offset].to_string()
                    }
                    None => {
                        self.doc.issues.push(format!("unterminated attribute value at offset {}", start));
                        self.pos = self.src.len();
                        self.src[start..].to_string()
                    }
                }
            }
            _ => {
                let start = self.pos;
                while self.pos < self.bytes.len()
                    && !self.bytes[self.pos].is_ascii_whitespace()
                    && self.bytes[self.pos] != b'>'
                {
                    self.pos += 1;
                }
                self.src[start..self.pos].to_string()
            }
        }
    }

    /// Content of script/style runs to the matching close tag verbatim.
    fn raw_text(&mut self, index: usize, name: &str) {
        let needle = format!("</{}", name);
        let haystack = self.src[self.pos..].to_ascii_lowercase();
        match haystack.find(&needle) {
            Some(offset) => {
                let close_start = self.pos + offset;
                let end = self.src[close_start..]
                    .find('>')
                    .map(|o| close_start + o + 1)
                    .unwrap_or(self.src.len());
                let element = &mut self.doc.elements[index];
                element.close_start = close_start;
                element.end = end;
                self.pos = end;
            }
            None => {
                self.doc.issues.push(format!("unclosed <{}> at offset {}", name, self.doc.elements[index].start));
                let element = &mut self.doc.elements[index];
                element.close_start = self.src.len();
                element.end = self.src.len();
                self.pos = self.src.len();
            }
        }
    }

    fn close_tag(&mut self, at: usize) {
        self.pos = at + 2;
        let name = self.read_name().to_ascii_lowercase();
        let end = match self.src[self.pos..].find('>') {
            Some(offset) => self.pos + offset + 1,
            None => self.src.len(),
        };
        self.pos = end;

        let Some(depth) = self.stack.iter().rposition(|&i| self.doc.elements[i].name == name) else {
            self.doc.issues.push(format!("unmatched </{}> at offset {}", name, at));
            return;
        };

        // Elements left open inside this one end where it closes.
        for index in self.stack.drain(depth + 1..) {
            self.doc.elements[index].close_start = at;
            self.doc.elements[index].end = at;
        }
        if let Some(index) = self.stack.pop() {
            self.doc.elements[index].close_start = at;
            self.doc.elements[index].end = end;
        }
    }
}
