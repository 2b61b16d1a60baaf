//! An owned, ordered collection of instructions: one computation graph.
//!
//! The module is the unit every pass operates on. Instructions live in a
//! stable arena (petgraph `StableGraph`), so an instruction's identity
//! survives unrelated mutations; a separate program-order list keeps the
//! total schedule, which is always a topological sort of the dependency DAG.
//! petgraph data edges mirror the input lists and back acyclicity checks and
//! reachability queries.
//!
//! Mutation primitives (`insert_instruction`, `replace_instruction`,
//! `replace_uses`, `replace_return`, `remove_instruction`) maintain both
//! edge directions transactionally: every input list change is reflected in
//! the affected instructions' output lists and in the petgraph edges.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::stable_graph::StableGraph;
use petgraph::visit::{Dfs, EdgeRef, Reversed};
use petgraph::Direction;

use crate::argument::Argument;
use crate::instruction::{InsId, Instruction};
use crate::operation::{Literal, Operation, Outline, Param, Return};
use crate::program::ModuleId;
use crate::shape::Shape;
use crate::{Error, Result};

/// One computation graph: an instruction arena plus its program order.
pub struct Module {
    name: String,
    graph: StableGraph<Instruction, ()>,
    order: Vec<InsId>,
    bypass: bool,
}

impl Module {
    /// Create an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: StableGraph::new(),
            order: Vec::new(),
            bypass: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mark this module as a pass-manager helper whose instructions are not
    /// part of the externally visible schedule (offloaded partitions).
    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    pub fn bypass(&self) -> bool {
        self.bypass
    }

    // ── Access ──

    /// Get an instruction by id.
    pub fn instruction(&self, id: InsId) -> Result<&Instruction> {
        self.graph
            .node_weight(id)
            .ok_or_else(|| Error::InvalidGraph(format!("instruction {:?} not found", id)))
    }

    /// Whether `id` refers to a live instruction of this module.
    pub fn has_instruction(&self, id: InsId) -> bool {
        self.graph.node_weight(id).is_some()
    }

    /// Snapshot of the program order. Callers that mutate mid-iteration must
    /// capture endpoints before mutating; the snapshot stays valid because
    /// identities are stable, but newly inserted instructions won't appear.
    pub fn ids(&self) -> Vec<InsId> {
        self.order.clone()
    }

    /// Iterate instructions in program order.
    pub fn iter(&self) -> impl Iterator<Item = (InsId, &Instruction)> + '_ {
        self.order.iter().map(move |&id| (id, &self.graph[id]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The last instruction in program order.
    pub fn last_ins(&self) -> Option<InsId> {
        self.order.last().copied()
    }

    /// The `@return` instruction, if the module has one.
    pub fn return_ins(&self) -> Option<InsId> {
        self.order
            .iter()
            .rev()
            .copied()
            .find(|&id| self.graph[id].name() == "@return")
    }

    /// The instructions producing the module's externally visible outputs:
    /// the return's operands, or the last instruction when there is no
    /// explicit return.
    pub fn output_ids(&self) -> Vec<InsId> {
        match self.return_ins() {
            Some(ret) => self.graph[ret].inputs.clone(),
            None => self.last_ins().into_iter().collect(),
        }
    }

    /// Shapes of the module's externally visible outputs.
    pub fn get_output_shapes(&self) -> Vec<Shape> {
        self.output_ids()
            .iter()
            .map(|&id| self.graph[id].shape.clone())
            .collect()
    }

    /// Names of the module's parameters, in program order.
    pub fn parameter_names(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|&id| self.graph[id].op_as::<Param>())
            .map(|p| p.name.clone())
            .collect()
    }

    /// Find a parameter instruction by name.
    pub fn get_parameter(&self, name: &str) -> Option<InsId> {
        self.order.iter().copied().find(|&id| {
            self.graph[id]
                .op_as::<Param>()
                .is_some_and(|p| p.name == name)
        })
    }

    /// Resolve through alias-preserving wrapper operations to the
    /// instruction that owns the underlying buffer. Pure lookup; terminates
    /// because it only follows acyclic input edges.
    pub fn get_output_alias(&self, id: InsId) -> InsId {
        let mut cur = id;
        loop {
            let Some(ins) = self.graph.node_weight(cur) else {
                return cur;
            };
            match ins.op.output_alias() {
                Some(i) if i < ins.inputs.len() => cur = ins.inputs[i],
                _ => return cur,
            }
        }
    }

    /// All instructions reachable from `roots` along input edges (the roots
    /// included).
    pub fn reachable_from(&self, roots: &[InsId]) -> HashSet<InsId> {
        let rev = Reversed(&self.graph);
        let mut seen = HashSet::new();
        for &root in roots {
            if !self.has_instruction(root) {
                continue;
            }
            let mut dfs = Dfs::new(rev, root);
            while let Some(n) = dfs.next(rev) {
                seen.insert(n);
            }
        }
        seen
    }

    // ── Construction / mutation ──

    /// Add a named parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter with the same name already exists.
    pub fn add_parameter(&mut self, name: &str, shape: Shape) -> Result<InsId> {
        if self.get_parameter(name).is_some() {
            return Err(Error::InvalidGraph(format!(
                "module '{}' already has a parameter '{}'",
                self.name, name
            )));
        }
        let op = Param {
            name: name.to_string(),
            shape: shape.clone(),
        };
        self.insert_raw(
            self.order.len(),
            Instruction::new(Arc::new(op), shape, Vec::new(), Vec::new()),
        )
    }

    /// Add a literal constant.
    pub fn add_literal(&mut self, value: Argument) -> InsId {
        let shape = value.shape().clone();
        let op = Literal { value };
        // Literals have no inputs; insertion cannot fail.
        match self.insert_raw(
            self.order.len(),
            Instruction::new(Arc::new(op), shape, Vec::new(), Vec::new()),
        ) {
            Ok(id) => id,
            Err(_) => unreachable!("literal insertion has no failure path"),
        }
    }

    /// Add a shape-only outline placeholder.
    pub fn add_outline(&mut self, shape: Shape) -> InsId {
        let op = Outline {
            shape: shape.clone(),
        };
        match self.insert_raw(
            self.order.len(),
            Instruction::new(Arc::new(op), shape, Vec::new(), Vec::new()),
        ) {
            Ok(id) => id,
            Err(_) => unreachable!("outline insertion has no failure path"),
        }
    }

    /// Append an instruction at the end of the program order, inferring its
    /// shape eagerly.
    pub fn add_instruction(
        &mut self,
        op: impl Operation + 'static,
        inputs: &[InsId],
    ) -> Result<InsId> {
        self.insert_instruction(None, op, inputs)
    }

    /// Append an instruction that references submodules. `resolved` supplies
    /// the referenced modules for shape inference, parallel to `mods`.
    pub fn add_instruction_with_mods(
        &mut self,
        op: impl Operation + 'static,
        inputs: &[InsId],
        mods: Vec<ModuleId>,
        resolved: &[&Module],
    ) -> Result<InsId> {
        self.insert_arc(None, Arc::new(op), inputs, mods, resolved)
    }

    /// Insert an instruction immediately before `before` (or append when
    /// `before` is `None`), inferring its shape eagerly.
    ///
    /// # Errors
    ///
    /// Propagates the operation's shape-inference error, and rejects inputs
    /// that are scheduled at or after the insertion point.
    pub fn insert_instruction(
        &mut self,
        before: Option<InsId>,
        op: impl Operation + 'static,
        inputs: &[InsId],
    ) -> Result<InsId> {
        self.insert_arc(before, Arc::new(op), inputs, Vec::new(), &[])
    }

    /// Insert an instruction with submodule references before `before`.
    pub fn insert_instruction_with_mods(
        &mut self,
        before: Option<InsId>,
        op: impl Operation + 'static,
        inputs: &[InsId],
        mods: Vec<ModuleId>,
        resolved: &[&Module],
    ) -> Result<InsId> {
        self.insert_arc(before, Arc::new(op), inputs, mods, resolved)
    }

    /// Rewrite `target` in place: new operation, inputs, and submodules,
    /// with the shape recomputed. All existing consumers keep their
    /// reference and see the new operation and shape.
    ///
    /// The primitive does not require the new shape to equal the old one;
    /// callers that need that (copy propagation) check it beforehand.
    pub fn replace_instruction(
        &mut self,
        target: InsId,
        op: impl Operation + 'static,
        inputs: &[InsId],
    ) -> Result<InsId> {
        self.replace_arc(target, Arc::new(op), inputs, Vec::new(), &[])
    }

    /// [`Module::replace_instruction`] with submodule references.
    pub fn replace_instruction_with_mods(
        &mut self,
        target: InsId,
        op: impl Operation + 'static,
        inputs: &[InsId],
        mods: Vec<ModuleId>,
        resolved: &[&Module],
    ) -> Result<InsId> {
        self.replace_arc(target, Arc::new(op), inputs, mods, resolved)
    }

    /// Redirect every consumer of `old` (except `new` itself) to read `new`
    /// instead, recomputing the consumers' shapes.
    ///
    /// # Errors
    ///
    /// Returns an error if `new` is not scheduled before some consumer of
    /// `old`, which would break the topological order.
    pub fn replace_uses(&mut self, old: InsId, new: InsId) -> Result<()> {
        self.instruction(new)?;
        let consumers: Vec<InsId> = self.instruction(old)?.outputs.clone();
        let new_pos = self.position(new)?;
        let mut seen = HashSet::new();
        for c in consumers {
            if c == new || !seen.insert(c) {
                continue;
            }
            if self.position(c)? <= new_pos {
                return Err(Error::InvalidGraph(format!(
                    "replacement {:?} is not scheduled before consumer {:?}",
                    new, c
                )));
            }
            let ins = &self.graph[c];
            let inputs: Vec<InsId> = ins
                .inputs
                .iter()
                .map(|&i| if i == old { new } else { i })
                .collect();
            let op = ins.op_arc();
            let mods = ins.mods.clone();
            // Consumers with submodule references keep their cached shape;
            // plain consumers are re-inferred against the new input.
            if mods.is_empty() {
                self.replace_arc(c, op, &inputs, mods, &[])?;
            } else {
                self.relink_inputs(c, &inputs)?;
            }
        }
        Ok(())
    }

    /// Remove an instruction that has no remaining consumers.
    pub fn remove_instruction(&mut self, id: InsId) -> Result<()> {
        if !self.instruction(id)?.outputs.is_empty() {
            return Err(Error::InvalidGraph(format!(
                "instruction {:?} still has consumers",
                id
            )));
        }
        self.unlink_inputs(id)?;
        self.graph.remove_node(id);
        self.order.retain(|&x| x != id);
        Ok(())
    }

    /// Append a `@return` marking the module's outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the module already has a return.
    pub fn add_return(&mut self, outputs: &[InsId]) -> Result<InsId> {
        if self.return_ins().is_some() {
            return Err(Error::InvalidGraph(format!(
                "module '{}' already has a return",
                self.name
            )));
        }
        self.insert_instruction(None, Return, outputs)
    }

    /// Rewrite (or insert) the `@return` so the module's externally visible
    /// outputs are exactly `outputs`, in order.
    pub fn replace_return(&mut self, outputs: &[InsId]) -> Result<InsId> {
        match self.return_ins() {
            Some(ret) => self.replace_arc(ret, Arc::new(Return), outputs, Vec::new(), &[]),
            None => self.add_return(outputs),
        }
    }

    // ── Validation ──

    /// Check the module's structural invariants: program order is a
    /// topological sort, input/output lists are transposes of each other,
    /// the graph is acyclic, and at most one `@return` exists, appearing
    /// last.
    pub fn validate(&self) -> Result<()> {
        if self.order.len() != self.graph.node_count() {
            return Err(Error::InvalidGraph(format!(
                "module '{}': schedule covers {} of {} instructions",
                self.name,
                self.order.len(),
                self.graph.node_count()
            )));
        }
        let pos: HashMap<InsId, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        for (&id, &p) in &pos {
            let ins = self.instruction(id)?;
            for &input in &ins.inputs {
                let ip = *pos.get(&input).ok_or_else(|| {
                    Error::InvalidGraph(format!("{:?} depends on foreign instruction", id))
                })?;
                if ip >= p {
                    return Err(Error::InvalidGraph(format!(
                        "{:?} depends on later instruction {:?}",
                        id, input
                    )));
                }
                let uses = ins.inputs.iter().filter(|&&x| x == input).count();
                let listed = self.graph[input].outputs.iter().filter(|&&x| x == id).count();
                if uses != listed {
                    return Err(Error::InvalidGraph(format!(
                        "{:?} uses {:?} {} times but is listed {} times as its consumer",
                        id, input, uses, listed
                    )));
                }
            }
            if ins.name() == "@return" && Some(id) != self.last_ins() {
                return Err(Error::InvalidGraph(format!(
                    "module '{}': @return is not the last instruction",
                    self.name
                )));
            }
        }
        if petgraph::algo::is_cyclic_directed(&self.graph) {
            return Err(Error::InvalidGraph(format!(
                "module '{}' contains a dependency cycle",
                self.name
            )));
        }
        Ok(())
    }

    // ── Internals ──

    fn position(&self, id: InsId) -> Result<usize> {
        self.order
            .iter()
            .position(|&x| x == id)
            .ok_or_else(|| Error::InvalidGraph(format!("instruction {:?} not scheduled", id)))
    }

    fn input_shapes(&self, inputs: &[InsId]) -> Result<Vec<Shape>> {
        inputs
            .iter()
            .map(|&i| Ok(self.instruction(i)?.shape.clone()))
            .collect()
    }

    fn insert_arc(
        &mut self,
        before: Option<InsId>,
        op: Arc<dyn Operation>,
        inputs: &[InsId],
        mods: Vec<ModuleId>,
        resolved: &[&Module],
    ) -> Result<InsId> {
        if resolved.len() != mods.len() {
            return Err(Error::InvalidGraph(
                "submodule references and resolved modules differ in count".to_string(),
            ));
        }
        let pos = match before {
            Some(b) => self.position(b)?,
            None => self.order.len(),
        };
        let shapes = self.input_shapes(inputs)?;
        for &i in inputs {
            if self.position(i)? >= pos {
                return Err(Error::InvalidGraph(format!(
                    "input {:?} is scheduled at or after the insertion point",
                    i
                )));
            }
        }
        let shape = op.compute_shape(&shapes, resolved)?;
        self.insert_raw(pos, Instruction::new(op, shape, inputs.to_vec(), mods))
    }

    /// Append a structurally copied instruction, trusting its cached shape.
    pub(crate) fn insert_copied(
        &mut self,
        op: Arc<dyn Operation>,
        shape: Shape,
        inputs: &[InsId],
        mods: Vec<ModuleId>,
    ) -> Result<InsId> {
        self.insert_raw(
            self.order.len(),
            Instruction::new(op, shape, inputs.to_vec(), mods),
        )
    }

    fn insert_raw(&mut self, pos: usize, ins: Instruction) -> Result<InsId> {
        for &i in &ins.inputs {
            self.instruction(i)?;
        }
        let inputs = ins.inputs.clone();
        let id = self.graph.add_node(ins);
        for &i in &inputs {
            self.graph[i].outputs.push(id);
            self.graph.add_edge(i, id, ());
        }
        self.order.insert(pos, id);
        Ok(id)
    }

    fn replace_arc(
        &mut self,
        target: InsId,
        op: Arc<dyn Operation>,
        inputs: &[InsId],
        mods: Vec<ModuleId>,
        resolved: &[&Module],
    ) -> Result<InsId> {
        if resolved.len() != mods.len() {
            return Err(Error::InvalidGraph(
                "submodule references and resolved modules differ in count".to_string(),
            ));
        }
        self.instruction(target)?;
        let pos = self.position(target)?;
        let shapes = self.input_shapes(inputs)?;
        for &i in inputs {
            if self.position(i)? >= pos {
                return Err(Error::InvalidGraph(format!(
                    "input {:?} is not scheduled before {:?}",
                    i, target
                )));
            }
        }
        let shape = op.compute_shape(&shapes, resolved)?;
        self.unlink_inputs(target)?;
        for &i in inputs {
            self.graph[i].outputs.push(target);
            self.graph.add_edge(i, target, ());
        }
        let ins = &mut self.graph[target];
        ins.op = op;
        ins.inputs = inputs.to_vec();
        ins.mods = mods;
        ins.shape = shape;
        Ok(target)
    }

    /// Swap an instruction's input list without re-inferring its shape.
    fn relink_inputs(&mut self, target: InsId, inputs: &[InsId]) -> Result<()> {
        for &i in inputs {
            self.instruction(i)?;
        }
        self.unlink_inputs(target)?;
        for &i in inputs {
            self.graph[i].outputs.push(target);
            self.graph.add_edge(i, target, ());
        }
        self.graph[target].inputs = inputs.to_vec();
        Ok(())
    }

    /// Drop `target` from its inputs' output lists and remove the mirrored
    /// petgraph edges.
    fn unlink_inputs(&mut self, target: InsId) -> Result<()> {
        let old_inputs = self.instruction(target)?.inputs.clone();
        for &i in &old_inputs {
            self.graph[i].outputs.retain(|&o| o != target);
        }
        let incoming: Vec<_> = self
            .graph
            .edges_directed(target, Direction::Incoming)
            .map(|e| e.id())
            .collect();
        for e in incoming {
            self.graph.remove_edge(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pos: HashMap<InsId, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        writeln!(f, "module {}:", self.name)?;
        for (i, &id) in self.order.iter().enumerate() {
            let ins = &self.graph[id];
            let inputs: Vec<usize> = ins.inputs.iter().map(|x| pos[x]).collect();
            writeln!(f, "  %{} = {}({:?}) -> {}", i, ins.name(), inputs, ins.shape)?;
        }
        Ok(())
    }
}

/// Structural equality: same instruction sequence with the same operations
/// (including attributes and literal values), shapes, operand positions, and
/// submodule references. Arena indices and module names are ignored.
impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        if self.order.len() != other.order.len() {
            return false;
        }
        let pos_a: HashMap<InsId, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        let pos_b: HashMap<InsId, usize> = other
            .order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        self.order.iter().zip(&other.order).all(|(&ia, &ib)| {
            let a = &self.graph[ia];
            let b = &other.graph[ib];
            a.shape == b.shape
                && format!("{:?}", a.op) == format!("{:?}", b.op)
                && a.mods == b.mods
                && a.inputs.len() == b.inputs.len()
                && a.inputs
                    .iter()
                    .zip(&b.inputs)
                    .all(|(x, y)| pos_a[x] == pos_b[y])
        })
    }
}

/// Copy the instruction range `range` (in program order) from `src` to the
/// end of `dst`, remapping operands through `map_ins`.
///
/// Already-mapped instructions are reused; literals, parameters, and
/// outlines are re-created through the destination's own constructors. A
/// `@return` encountered mid-range stops the copy and its operands become
/// the declared outputs. Otherwise the outputs default to the copy of the
/// last instruction visited.
///
/// # Errors
///
/// Returns an error if a copied instruction's operand was neither copied nor
/// pre-seeded in `map_ins` — the range is not self-contained.
pub fn copy_instructions(
    dst: &mut Module,
    src: &Module,
    range: &[InsId],
    map_ins: &mut HashMap<InsId, InsId>,
) -> Result<Vec<InsId>> {
    let mut mod_outputs = Vec::new();
    let mut last = None;
    for &sid in range {
        last = Some(sid);
        if map_ins.contains_key(&sid) {
            continue;
        }
        let ins = src.instruction(sid)?;
        let copy_id = if let Some(lit) = ins.op_as::<Literal>() {
            dst.add_literal(lit.value.clone())
        } else if let Some(param) = ins.op_as::<Param>() {
            dst.add_parameter(&param.name, param.shape.clone())?
        } else if ins.op_as::<Outline>().is_some() {
            dst.add_outline(ins.shape().clone())
        } else {
            let inputs = ins
                .inputs()
                .iter()
                .map(|i| {
                    map_ins.get(i).copied().ok_or_else(|| {
                        Error::InvalidGraph(format!(
                            "operand {:?} of {} escapes the copied range",
                            i,
                            ins.name()
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            if ins.name() == "@return" {
                mod_outputs = inputs;
                break;
            }
            dst.insert_copied(
                ins.op_arc(),
                ins.shape().clone(),
                &inputs,
                ins.module_refs().to_vec(),
            )?
        };
        map_ins.insert(sid, copy_id);
    }
    if mod_outputs.is_empty() {
        if let Some(last) = last {
            let mapped = map_ins.get(&last).copied().ok_or_else(|| {
                Error::InvalidGraph("copied range produced no output".to_string())
            })?;
            mod_outputs = vec![mapped];
        }
    }
    Ok(mod_outputs)
}
