// Lookup, lock-step search and dot rendering over any transducer graph.
//
// In-memory and storage-backed transducers both expose their states through
// `Graph`; the walks here never need more than the states on the current
// path, so storage-backed searches decode records on demand.

use std::borrow::Cow;
use std::io::Write;

use hashbrown::HashSet;

use crate::FstError;
use crate::config::SearchConfig;
use crate::matcher::Matcher;
use crate::output::Output;
use crate::state::{Addr, State};

/// Read access to the states of a frozen transducer.
pub trait Graph<O: Output> {
    fn root(&self) -> Addr;

    /// Decode (or borrow) the state at `addr`.
    fn load(&self, addr: Addr) -> Result<Cow<'_, State<O>>, FstError>;

    /// Key buffer size for searches over this graph.
    fn key_length_limit(&self) -> usize;

    /// Follow the arc labelled `symbol` out of `addr`.
    fn transition(&self, addr: Addr, symbol: char) -> Result<Option<(O, Addr)>, FstError> {
        let state = self.load(addr)?;
        Ok(state
            .find_arc(symbol)
            .map(|arc| (arc.output.clone(), arc.target)))
    }

    /// Final output of `addr`, or `None` if it is not final.
    fn final_output(&self, addr: Addr) -> Result<Option<O>, FstError> {
        let state = self.load(addr)?;
        Ok(state.is_final.then(|| state.final_output.clone()))
    }
}

/// Exact lookup: walk `key` from the root, summing arc outputs.
pub fn lookup<O: Output, G: Graph<O> + ?Sized>(
    graph: &G,
    key: &str,
) -> Result<Option<O>, FstError> {
    let mut addr = graph.root();
    let mut output = O::zero();
    for symbol in key.chars() {
        match graph.transition(addr, symbol)? {
            Some((arc_output, target)) => {
                output = output.add(&arc_output);
                addr = target;
            }
            None => return Ok(None),
        }
    }
    Ok(graph
        .final_output(addr)?
        .map(|final_output| output.add(&final_output)))
}

struct Frame<'a, O: Output> {
    state: Cow<'a, State<O>>,
    next_arc: usize,
    /// Output accumulated on the path down to this state.
    output: O,
}

/// Lazy, sorted enumeration of the keys accepted by both a transducer and a
/// [`Matcher`], paired with their outputs.
///
/// Both automata are stepped together depth first, visiting arcs in symbol
/// order, so keys come out in ascending ordinal order. Branches the matcher
/// rejects are never entered. Dropping the iterator abandons the walk.
pub struct Search<'a, O: Output, G: ?Sized, M> {
    graph: &'a G,
    matcher: M,
    config: SearchConfig<Frame<'a, O>>,
    started: bool,
    done: bool,
}

impl<'a, O: Output, G: Graph<O> + ?Sized, M: Matcher> Search<'a, O, G, M> {
    pub fn new(graph: &'a G, matcher: M) -> Self {
        let limit = graph.key_length_limit();
        Self::with_limit(graph, matcher, limit)
    }

    /// Search building keys of at most `max_key_length` symbols.
    pub fn with_limit(graph: &'a G, matcher: M, max_key_length: usize) -> Self {
        Self {
            graph,
            matcher,
            config: SearchConfig::new(max_key_length),
            started: false,
            done: false,
        }
    }

    /// Restart the enumeration from the first key.
    pub fn reset(&mut self) {
        self.config.reset();
        self.started = false;
        self.done = false;
    }

    fn start(&mut self) -> Result<Option<(String, O)>, FstError> {
        self.started = true;
        self.matcher.reset();
        let graph = self.graph;
        let state = graph.load(graph.root())?;
        let hit = (state.is_final && self.matcher.is_final())
            .then(|| (String::new(), state.final_output.clone()));
        self.config.frames.push(Frame {
            state,
            next_arc: 0,
            output: O::zero(),
        });
        Ok(hit)
    }

    fn advance(&mut self) -> Result<Option<(String, O)>, FstError> {
        if !self.started {
            if let Some(hit) = self.start()? {
                return Ok(Some(hit));
            }
        }

        loop {
            let can_descend = self.config.can_descend();
            let Some(top) = self.config.frames.last_mut() else {
                return Ok(None);
            };

            if top.next_arc < top.state.arcs.len() {
                let arc = &top.state.arcs[top.next_arc];
                top.next_arc += 1;
                if !can_descend || !self.matcher.next(arc.symbol) {
                    continue;
                }
                let (symbol, target) = (arc.symbol, arc.target);
                let output = top.output.add(&arc.output);

                let graph = self.graph;
                let state = graph.load(target)?;
                self.config.key.push(symbol);
                let hit = (state.is_final && self.matcher.is_final())
                    .then(|| output.add(&state.final_output));
                self.config.frames.push(Frame {
                    state,
                    next_arc: 0,
                    output,
                });
                if let Some(output) = hit {
                    return Ok(Some((self.config.key.iter().collect(), output)));
                }
            } else {
                self.config.frames.pop();
                if !self.config.frames.is_empty() {
                    self.matcher.pop();
                    self.config.key.pop();
                }
            }
        }
    }
}

impl<O: Output, G: Graph<O> + ?Sized, M: Matcher> Iterator for Search<'_, O, G, M> {
    type Item = Result<(String, O), FstError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(hit)) => Some(Ok(hit)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Render every reachable state and arc exactly once in Graphviz dot syntax.
pub fn write_dot<O: Output, G: Graph<O> + ?Sized>(
    graph: &G,
    out: &mut dyn Write,
) -> Result<(), FstError> {
    writeln!(out, "digraph fst {{")?;
    writeln!(out, "  rankdir = LR;")?;
    writeln!(out, "  node [shape = circle, label = \"\"];")?;

    let root = graph.root();
    let mut visited = HashSet::new();
    let mut stack = vec![root];
    visited.insert(root);
    while let Some(addr) = stack.pop() {
        let state = graph.load(addr)?;
        let mut attrs = Vec::new();
        if state.is_final {
            attrs.push("shape = doublecircle".to_string());
            if !state.final_output.is_zero() {
                let label = format!("{:?}", state.final_output);
                attrs.push(format!("xlabel = \"{}\"", escape(&label)));
            }
        }
        if addr == root {
            attrs.push("style = bold".to_string());
        }
        if attrs.is_empty() {
            writeln!(out, "  s{addr};")?;
        } else {
            writeln!(out, "  s{addr} [{}];", attrs.join(", "))?;
        }

        for arc in &state.arcs {
            let label = if arc.output.is_zero() {
                arc.symbol.to_string()
            } else {
                format!("{}/{:?}", arc.symbol, arc.output)
            };
            writeln!(
                out,
                "  s{addr} -> s{} [label = \"{}\"];",
                arc.target,
                escape(&label)
            )?;
            if visited.insert(arc.target) {
                stack.push(arc.target);
            }
        }
    }
    writeln!(out, "}}")?;
    Ok(())
}

fn escape(label: &str) -> String {
    let mut escaped = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '"' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}
