//! A CSS selector subset.
//!
//! Supported: selector lists, descendant (` `) and child (`>`) combinators,
//! type and universal selectors, `#id`, `.class`, attribute selectors with
//! `=`, `~=`, `*=`, `^=`, `$=` and an optional `i`/`s` flag, and `:has(...)`.
//! Any other pseudo-class parses but never matches.

use crate::dom::ElementId;
use crate::error::{Error, Result};

/// Read access to an element tree, as needed for matching.
pub trait ElementTree {
    /// Lowercase tag name of an element.
    fn tag_name(&self, element: ElementId) -> Option<&str>;

    /// Value of an attribute. Names are lowercase.
    fn attribute(&self, element: ElementId, name: &str) -> Option<&str>;

    /// Parent element, if any.
    fn parent(&self, element: ElementId) -> Option<ElementId>;

    /// Child elements in document order.
    fn children(&self, element: ElementId) -> &[ElementId];
}

/// A parsed, comma-separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(Vec<Complex>);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    simple: Vec<Simple>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Simple {
    Id(String),
    Class(String),
    Attribute(AttributeSelector),
    Has(SelectorList),
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeSelector {
    name: String,
    condition: Option<(AttributeOp, String)>,
    ignore_case: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeOp {
    Equals,
    Includes,
    Contains,
    Prefix,
    Suffix,
}

impl SelectorList {
    /// Parse a selector list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dom`] if the input is not a supported selector.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser::new(input);
        let list = parser.parse_list(false)?;
        parser.skip_whitespace();
        if let Some(c) = parser.peek() {
            return Err(parser.error(&format!("unexpected '{c}'")));
        }
        Ok(list)
    }

    /// Whether `element` matches any selector in the list.
    pub fn matches<T: ElementTree + ?Sized>(&self, tree: &T, element: ElementId) -> bool {
        self.0.iter().any(|complex| complex.matches(tree, element))
    }

    /// All elements under `root` (inclusive) that match, in document order.
    pub fn select_all<T: ElementTree + ?Sized>(&self, tree: &T, root: ElementId) -> Vec<ElementId> {
        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(element) = stack.pop() {
            if self.matches(tree, element) {
                found.push(element);
            }
            stack.extend(tree.children(element).iter().rev());
        }
        found
    }

    /// First element under `root` (inclusive) that matches.
    pub fn select_first<T: ElementTree + ?Sized>(
        &self,
        tree: &T,
        root: ElementId,
    ) -> Option<ElementId> {
        let mut stack = vec![root];
        while let Some(element) = stack.pop() {
            if self.matches(tree, element) {
                return Some(element);
            }
            stack.extend(tree.children(element).iter().rev());
        }
        None
    }

    fn matches_descendant<T: ElementTree + ?Sized>(&self, tree: &T, element: ElementId) -> bool {
        tree.children(element)
            .iter()
            .any(|&child| self.select_first(tree, child).is_some())
    }
}

impl Complex {
    fn matches<T: ElementTree + ?Sized>(&self, tree: &T, element: ElementId) -> bool {
        self.match_at(tree, element, self.compounds.len() - 1)
    }

    fn match_at<T: ElementTree + ?Sized>(&self, tree: &T, element: ElementId, index: usize) -> bool {
        if !self.compounds[index].matches(tree, element) {
            return false;
        }
        if index == 0 {
            return true;
        }

        match self.combinators[index - 1] {
            Combinator::Child => tree
                .parent(element)
                .is_some_and(|parent| self.match_at(tree, parent, index - 1)),
            Combinator::Descendant => {
                let mut ancestor = tree.parent(element);
                while let Some(candidate) = ancestor {
                    if self.match_at(tree, candidate, index - 1) {
                        return true;
                    }
                    ancestor = tree.parent(candidate);
                }
                false
            }
        }
    }
}

impl Compound {
    fn matches<T: ElementTree + ?Sized>(&self, tree: &T, element: ElementId) -> bool {
        let Some(tag) = tree.tag_name(element) else {
            return false;
        };
        if let Some(expected) = &self.tag {
            if !expected.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        self.simple.iter().all(|simple| simple.matches(tree, element))
    }
}

impl Simple {
    fn matches<T: ElementTree + ?Sized>(&self, tree: &T, element: ElementId) -> bool {
        match self {
            Self::Id(id) => tree.attribute(element, "id") == Some(id.as_str()),
            Self::Class(class) => tree
                .attribute(element, "class")
                .is_some_and(|classes| classes.split_whitespace().any(|c| c == class)),
            Self::Attribute(attribute) => attribute.matches(tree.attribute(element, &attribute.name)),
            Self::Has(list) => list.matches_descendant(tree, element),
            Self::Unsupported(_) => false,
        }
    }
}

impl AttributeSelector {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        let Some((op, expected)) = &self.condition else {
            return true;
        };

        let (actual, expected) = if self.ignore_case {
            (actual.to_lowercase(), expected.to_lowercase())
        } else {
            (actual.to_string(), expected.clone())
        };

        match op {
            AttributeOp::Equals => actual == expected,
            AttributeOp::Includes => actual.split_whitespace().any(|word| word == expected),
            AttributeOp::Contains => !expected.is_empty() && actual.contains(&expected),
            AttributeOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            AttributeOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::dom(format!(
            "invalid selector '{}' at {}: {message}",
            self.input, self.pos
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos != start
    }

    fn parse_list(&mut self, nested: bool) -> Result<SelectorList> {
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            selectors.push(self.parse_complex()?);
            self.skip_whitespace();
            if self.eat(',') {
                continue;
            }
            match self.peek() {
                None => break,
                Some(')') if nested => break,
                Some(c) => return Err(self.error(&format!("unexpected '{c}'"))),
            }
        }
        Ok(SelectorList(selectors))
    }

    fn parse_complex(&mut self) -> Result<Complex> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();

        loop {
            let had_space = self.skip_whitespace();
            let combinator = match self.peek() {
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    Combinator::Child
                }
                None | Some(',' | ')') => break,
                Some(_) if had_space => Combinator::Descendant,
                Some(c) => return Err(self.error(&format!("unexpected '{c}'"))),
            };
            combinators.push(combinator);
            compounds.push(self.parse_compound()?);
        }

        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound> {
        let start = self.pos;
        let tag = if self.eat('*') {
            None
        } else if self.peek().is_some_and(is_ident_char) {
            Some(self.parse_ident()?.to_ascii_lowercase())
        } else {
            None
        };

        let mut simple = Vec::new();
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    simple.push(Simple::Id(self.parse_ident()?));
                }
                Some('.') => {
                    self.pos += 1;
                    simple.push(Simple::Class(self.parse_ident()?));
                }
                Some('[') => {
                    self.pos += 1;
                    simple.push(Simple::Attribute(self.parse_attribute()?));
                }
                Some(':') => {
                    self.pos += 1;
                    simple.push(self.parse_pseudo()?);
                }
                _ => break,
            }
        }

        if self.pos == start {
            return Err(self.error("expected a selector"));
        }
        Ok(Compound { tag, simple })
    }

    fn parse_ident(&mut self) -> Result<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected an identifier"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_attribute(&mut self) -> Result<AttributeSelector> {
        self.skip_whitespace();
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_whitespace();

        if self.eat(']') {
            return Ok(AttributeSelector {
                name,
                condition: None,
                ignore_case: false,
            });
        }

        let op = match self.bump() {
            Some('=') => AttributeOp::Equals,
            Some(prefix @ ('~' | '*' | '^' | '$')) => {
                self.expect('=')?;
                match prefix {
                    '~' => AttributeOp::Includes,
                    '*' => AttributeOp::Contains,
                    '^' => AttributeOp::Prefix,
                    _ => AttributeOp::Suffix,
                }
            }
            _ => return Err(self.error("expected an attribute operator")),
        };

        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.expect(quote)?;
                value
            }
            _ => self.parse_ident()?,
        };

        self.skip_whitespace();
        let ignore_case = match self.peek() {
            Some('i' | 'I') => {
                self.pos += 1;
                true
            }
            Some('s' | 'S') => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        self.skip_whitespace();
        self.expect(']')?;

        Ok(AttributeSelector {
            name,
            condition: Some((op, value)),
            ignore_case,
        })
    }

    fn parse_pseudo(&mut self) -> Result<Simple> {
        // Pseudo-elements never match.
        self.eat(':');
        let name = self.parse_ident()?.to_ascii_lowercase();

        if !self.eat('(') {
            return Ok(Simple::Unsupported(name));
        }

        if name == "has" {
            let list = self.parse_list(true)?;
            self.expect(')')?;
            return Ok(Simple::Has(list));
        }

        let mut depth = 1;
        while depth > 0 {
            match self.bump() {
                Some('(') => depth += 1,
                Some(')') => depth -= 1,
                Some(_) => {}
                None => return Err(self.error("unbalanced parentheses")),
            }
        }
        Ok(Simple::Unsupported(name))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}
