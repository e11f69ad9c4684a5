//! Rule and schema definition types.

use std::fmt;
use std::sync::Arc;

use rulebank_core::{AttrId, AttrRef, EntityKey, Row, RuleId, TypeId, Value, ValueKind};
use thiserror::Error;

/// Attribute declaration within a type.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrDef {
    /// Attribute name.
    pub name: String,
    /// Declared value kind.
    pub kind: ValueKind,
}

impl AttrDef {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A resolved attribute: its stable id, owner type, name and kind.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrInfo {
    pub id: AttrId,
    pub type_id: TypeId,
    pub name: String,
    pub kind: ValueKind,
}

impl AttrInfo {
    pub fn attr_ref(&self) -> AttrRef {
        AttrRef::new(self.type_id, self.id)
    }
}

/// Entity type definition.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// Unique identifier.
    pub id: TypeId,
    /// Type name.
    pub name: String,
    /// Attribute ids in declaration order.
    pub attributes: Vec<AttrId>,
}

/// Identifier for a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipId(pub u32);

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel{}", self.0)
    }
}

/// An attribute bound to its stable id, carrying the name used to read rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundAttr {
    pub attr: AttrRef,
    pub name: String,
}

/// One-to-many relationship: each child references its parent through `fk`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipDef {
    pub id: RelationshipId,
    pub name: String,
    pub parent: TypeId,
    pub child: TypeId,
    /// Foreign key attribute on the child, holding `Value::Ref(parent)`.
    pub fk: BoundAttr,
}

/// What a constraint predicate sees: the settled row and its committed state.
#[derive(Debug, Clone, Copy)]
pub struct RowState<'a> {
    row: &'a Row,
    prior: Option<&'a Row>,
}

impl<'a> RowState<'a> {
    pub fn new(row: &'a Row, prior: Option<&'a Row>) -> Self {
        Self { row, prior }
    }

    /// The settled row.
    pub fn row(&self) -> &'a Row {
        self.row
    }

    /// The committed row, None for inserts.
    pub fn prior(&self) -> Option<&'a Row> {
        self.prior
    }

    /// Current value of an attribute, absent reads as Null.
    pub fn get(&self, name: &str) -> &'a Value {
        self.row.value(name)
    }

    /// Committed value of an attribute, Null for inserts.
    pub fn old(&self, name: &str) -> &'a Value {
        static NULL: Value = Value::Null;
        self.prior.map_or(&NULL, |p| p.value(name))
    }

    /// Returns true if this row did not exist before the unit of work.
    pub fn is_insert(&self) -> bool {
        self.prior.is_none()
    }
}

/// Inputs of a formula: the row being computed and its resolved parents.
#[derive(Debug)]
pub struct FormulaContext<'a> {
    row: &'a Row,
    parents: Vec<(&'a str, Option<&'a Row>)>,
}

impl<'a> FormulaContext<'a> {
    pub fn new(row: &'a Row, parents: Vec<(&'a str, Option<&'a Row>)>) -> Self {
        Self { row, parents }
    }

    /// The row the formula computes an attribute for.
    pub fn row(&self) -> &'a Row {
        self.row
    }

    /// Current value of one of the row's own attributes.
    pub fn get(&self, name: &str) -> &'a Value {
        self.row.value(name)
    }

    /// The parent row reached through `relationship`, if the fk is set.
    pub fn parent(&self, relationship: &str) -> Option<&'a Row> {
        self.parents
            .iter()
            .find(|(name, _)| *name == relationship)
            .and_then(|(_, row)| *row)
    }

    /// An attribute of a parent row, Null when there is no parent.
    pub fn parent_value(&self, relationship: &str, attr: &str) -> &'a Value {
        static NULL: Value = Value::Null;
        self.parent(relationship).map_or(&NULL, |p| p.value(attr))
    }
}

/// Failure raised by a formula.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FormulaError {
    pub message: String,
}

impl FormulaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for FormulaError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for FormulaError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

type PredicateFn = dyn Fn(&RowState<'_>) -> bool + Send + Sync;
type RowFilterFn = dyn Fn(&Row) -> bool + Send + Sync;
type FormulaFn = dyn Fn(&FormulaContext<'_>) -> Result<Value, FormulaError> + Send + Sync;

/// Constraint predicate. Must be pure: no side effects, no mutation.
///
/// Two predicates are the same definition only if one is a clone of the other.
#[derive(Clone)]
pub struct Predicate(Arc<PredicateFn>);

impl Predicate {
    pub fn new(f: impl Fn(&RowState<'_>) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn eval(&self, state: &RowState<'_>) -> bool {
        (self.0)(state)
    }

    pub fn same_as(&self, other: &Predicate) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// Child row filter of a qualified sum or count.
#[derive(Clone)]
pub struct RowFilter(Arc<RowFilterFn>);

impl RowFilter {
    pub fn new(f: impl Fn(&Row) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn eval(&self, row: &Row) -> bool {
        (self.0)(row)
    }

    pub fn same_as(&self, other: &RowFilter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RowFilter(..)")
    }
}

/// Formula computing one attribute from the row and its parents.
#[derive(Clone)]
pub struct Formula(Arc<FormulaFn>);

impl Formula {
    pub fn new(
        f: impl Fn(&FormulaContext<'_>) -> Result<Value, FormulaError> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    pub fn eval(&self, ctx: &FormulaContext<'_>) -> Result<Value, FormulaError> {
        (self.0)(ctx)
    }

    pub fn same_as(&self, other: &Formula) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Formula(..)")
    }
}

/// Whether a violated constraint aborts the unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    /// Violation aborts the unit of work.
    #[default]
    Hard,
    /// Violation is reported as a warning only.
    Soft,
}

/// Constraint definition.
#[derive(Debug, Clone)]
pub struct ConstraintDef {
    pub id: RuleId,
    pub name: String,
    pub type_id: TypeId,
    pub severity: Severity,
    /// Message template with `{row.attr}` / `{old_row.attr}` placeholders.
    pub message: String,
    pub predicate: Predicate,
}

impl ConstraintDef {
    /// Identical definitions make re-registration a no-op.
    pub fn same_definition(&self, other: &ConstraintDef) -> bool {
        self.name == other.name
            && self.type_id == other.type_id
            && self.severity == other.severity
            && self.message == other.message
            && self.predicate.same_as(&other.predicate)
    }
}

/// Child filter attached to an aggregate.
#[derive(Debug, Clone)]
pub struct AggregateFilter {
    /// Child attributes the filter reads; changes to them re-qualify the child.
    pub attrs: Vec<BoundAttr>,
    pub filter: RowFilter,
}

/// Sum or count over the children of a relationship.
#[derive(Debug, Clone)]
pub struct AggregateDef {
    pub relationship: RelationshipId,
    pub child_type: TypeId,
    /// Foreign key on the child, copied from the relationship.
    pub fk: BoundAttr,
    /// Summed child attribute; None for counts.
    pub source: Option<BoundAttr>,
    pub filter: Option<AggregateFilter>,
}

impl AggregateDef {
    fn same_definition(&self, other: &AggregateDef) -> bool {
        let same_filter = match (&self.filter, &other.filter) {
            (None, None) => true,
            (Some(a), Some(b)) => a.attrs == b.attrs && a.filter.same_as(&b.filter),
            _ => false,
        };
        self.relationship == other.relationship && self.source == other.source && same_filter
    }

    /// Every child attribute whose change can move the aggregate.
    pub fn child_attrs(&self) -> Vec<&BoundAttr> {
        let mut attrs = vec![&self.fk];
        if let Some(source) = &self.source {
            attrs.push(source);
        }
        if let Some(filter) = &self.filter {
            attrs.extend(filter.attrs.iter());
        }
        attrs
    }
}

/// A parent attribute a formula reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentDependency {
    pub relationship: RelationshipId,
    pub relationship_name: String,
    /// Foreign key on the formula's own type.
    pub fk: BoundAttr,
    pub attr: BoundAttr,
}

/// Formula over the row's own attributes and its parents' attributes.
#[derive(Debug, Clone)]
pub struct FormulaDef {
    pub own: Vec<BoundAttr>,
    pub parents: Vec<ParentDependency>,
    pub formula: Formula,
}

impl FormulaDef {
    fn same_definition(&self, other: &FormulaDef) -> bool {
        self.own == other.own
            && self.parents == other.parents
            && self.formula.same_as(&other.formula)
    }
}

/// How a derived attribute is computed.
#[derive(Debug, Clone)]
pub enum DerivationKind {
    Sum(AggregateDef),
    Count(AggregateDef),
    Formula(FormulaDef),
}

impl DerivationKind {
    pub fn label(&self) -> &'static str {
        match self {
            DerivationKind::Sum(_) => "sum",
            DerivationKind::Count(_) => "count",
            DerivationKind::Formula(_) => "formula",
        }
    }

    /// The aggregate definition of a sum or count.
    pub fn aggregate(&self) -> Option<&AggregateDef> {
        match self {
            DerivationKind::Sum(agg) | DerivationKind::Count(agg) => Some(agg),
            DerivationKind::Formula(_) => None,
        }
    }
}

/// Derivation rule: the target attribute and how it is computed.
#[derive(Debug, Clone)]
pub struct DerivationDef {
    pub id: RuleId,
    /// Qualified target name, e.g. `Customer.balance`.
    pub name: String,
    pub target: BoundAttr,
    /// Declared kind of the target attribute.
    pub kind: ValueKind,
    pub rule: DerivationKind,
}

impl DerivationDef {
    /// Identical definitions make re-registration a no-op.
    pub fn same_definition(&self, other: &DerivationDef) -> bool {
        if self.target != other.target || self.kind != other.kind {
            return false;
        }
        match (&self.rule, &other.rule) {
            (DerivationKind::Sum(a), DerivationKind::Sum(b)) => a.same_definition(b),
            (DerivationKind::Count(a), DerivationKind::Count(b)) => a.same_definition(b),
            (DerivationKind::Formula(a), DerivationKind::Formula(b)) => a.same_definition(b),
            _ => false,
        }
    }

    /// Human readable description, e.g. `sum Customer.balance`.
    pub fn describe(&self) -> String {
        format!("{} {}", self.rule.label(), self.name)
    }

    /// Initial value of the target for a freshly inserted row, if the rule
    /// has one without evaluating anything.
    pub fn initial_value(&self) -> Option<Value> {
        match &self.rule {
            DerivationKind::Sum(_) | DerivationKind::Count(_) => self.kind.zero(),
            DerivationKind::Formula(_) => None,
        }
    }

    /// Reference to the parent entity of `child` for aggregates.
    pub fn parent_of(&self, child: &Row) -> Option<EntityKey> {
        self.rule.aggregate().and_then(|agg| child.reference(&agg.fk.name))
    }
}
