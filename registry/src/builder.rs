//! RuleSetBuilder for declaring types, relationships and rules.

use std::collections::HashMap;

use rulebank_core::{AttrId, Row, RuleId, TypeId, Value, ValueKind};
use tracing::debug;

use crate::{
    AggregateDef, AggregateFilter, AttrDef, AttrInfo, BoundAttr, ConfigResult,
    ConfigurationError, ConstraintDef, DerivationDef, DerivationKind, Formula, FormulaContext,
    FormulaDef, FormulaError, ParentDependency, Predicate, RelationshipDef, RelationshipId,
    RowFilter, RowState, RuleSet, Severity, TypeDef,
};

/// Builder for constructing an immutable RuleSet.
///
/// Rule ids are allocated from one sequence shared by derivations and
/// constraints, so they follow declaration order.
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    /// Next rule ID to allocate.
    next_rule_id: u32,

    /// Types being built, indexed by TypeId.
    types: Vec<TypeDef>,
    /// Type name to ID mapping.
    type_names: HashMap<String, TypeId>,

    /// Attributes, indexed by AttrId.
    attrs: Vec<AttrInfo>,
    /// (type, attribute name) to ID mapping.
    attr_names: HashMap<(TypeId, String), AttrId>,

    /// Relationships, indexed by RelationshipId.
    relationships: Vec<RelationshipDef>,
    /// Relationship name to ID mapping.
    relationship_names: HashMap<String, RelationshipId>,

    /// Constraints being built.
    constraints: Vec<ConstraintDef>,

    /// Derivations being built.
    derivations: Vec<DerivationDef>,
}

impl RuleSetBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity type.
    pub fn add_type(&mut self, name: impl Into<String>) -> TypeBuilder<'_> {
        TypeBuilder {
            builder: self,
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Add a one-to-many relationship.
    pub fn add_relationship(&mut self, name: impl Into<String>) -> RelationshipBuilder<'_> {
        RelationshipBuilder {
            builder: self,
            name: name.into(),
            parent: None,
            child: None,
            fk: None,
        }
    }

    /// Add a constraint.
    pub fn add_constraint(&mut self, name: impl Into<String>) -> ConstraintBuilder<'_> {
        ConstraintBuilder {
            builder: self,
            name: name.into(),
            type_name: None,
            severity: Severity::Hard,
            message: None,
            predicate: None,
        }
    }

    /// Derive `type_name.attr` as the sum of a child attribute.
    pub fn derive_sum(
        &mut self,
        type_name: impl Into<String>,
        attr: impl Into<String>,
    ) -> SumBuilder<'_> {
        SumBuilder {
            builder: self,
            spec: AggregateSpec::new(type_name.into(), attr.into()),
            source: None,
        }
    }

    /// Derive `type_name.attr` as the number of children.
    pub fn derive_count(
        &mut self,
        type_name: impl Into<String>,
        attr: impl Into<String>,
    ) -> CountBuilder<'_> {
        CountBuilder {
            builder: self,
            spec: AggregateSpec::new(type_name.into(), attr.into()),
        }
    }

    /// Derive `type_name.attr` from a formula over the row and its parents.
    pub fn derive_formula(
        &mut self,
        type_name: impl Into<String>,
        attr: impl Into<String>,
    ) -> FormulaBuilder<'_> {
        FormulaBuilder {
            builder: self,
            type_name: type_name.into(),
            attr: attr.into(),
            own: Vec::new(),
            parents: Vec::new(),
            formula: None,
        }
    }

    /// Build the immutable RuleSet.
    pub fn build(self) -> ConfigResult<RuleSet> {
        debug!(
            target: "rulebank::engine",
            types = self.types.len(),
            relationships = self.relationships.len(),
            derivations = self.derivations.len(),
            constraints = self.constraints.len(),
            "rule set built"
        );

        Ok(RuleSet::new(
            self.types,
            self.type_names,
            self.attrs,
            self.attr_names,
            self.relationships,
            self.relationship_names,
            self.constraints,
            self.derivations,
        ))
    }

    // ==================== Resolution ====================

    fn resolve_type(&self, name: &str) -> ConfigResult<TypeId> {
        self.type_names
            .get(name)
            .copied()
            .ok_or_else(|| ConfigurationError::UnknownType(name.to_string()))
    }

    fn type_name(&self, id: TypeId) -> &str {
        self.types
            .get(id.raw() as usize)
            .map_or("?", |t| t.name.as_str())
    }

    fn resolve_attr(&self, type_id: TypeId, name: &str) -> ConfigResult<(BoundAttr, ValueKind)> {
        let info = self
            .attr_names
            .get(&(type_id, name.to_string()))
            .and_then(|id| self.attrs.get(id.raw() as usize))
            .ok_or_else(|| ConfigurationError::unknown_attribute(self.type_name(type_id), name))?;
        let bound = BoundAttr {
            attr: info.attr_ref(),
            name: info.name.clone(),
        };
        Ok((bound, info.kind))
    }

    fn qualified(&self, type_id: TypeId, attr: &str) -> String {
        format!("{}.{}", self.type_name(type_id), attr)
    }

    /// Find the relationship from `parent` to `child`, by name if given.
    fn resolve_relationship(
        &self,
        parent: TypeId,
        child: TypeId,
        via: Option<&str>,
    ) -> ConfigResult<RelationshipDef> {
        let no_relationship = || ConfigurationError::NoRelationship {
            parent: self.type_name(parent).to_string(),
            child: self.type_name(child).to_string(),
        };

        if let Some(name) = via {
            let rel = self
                .relationship_names
                .get(name)
                .and_then(|id| self.relationships.get(id.0 as usize))
                .ok_or_else(|| ConfigurationError::UnknownRelationship(name.to_string()))?;
            if rel.parent != parent || rel.child != child {
                return Err(no_relationship());
            }
            return Ok(rel.clone());
        }

        let mut candidates = self
            .relationships
            .iter()
            .filter(|r| r.parent == parent && r.child == child);
        match (candidates.next(), candidates.next()) {
            (Some(rel), None) => Ok(rel.clone()),
            (None, _) => Err(no_relationship()),
            (Some(_), Some(_)) => Err(ConfigurationError::AmbiguousRelationship {
                parent: self.type_name(parent).to_string(),
                child: self.type_name(child).to_string(),
            }),
        }
    }

    fn allocate_rule_id(&mut self) -> RuleId {
        let id = RuleId::new(self.next_rule_id);
        self.next_rule_id += 1;
        id
    }

    fn register_derivation(
        &mut self,
        target: BoundAttr,
        kind: ValueKind,
        rule: DerivationKind,
    ) -> ConfigResult<RuleId> {
        let name = self.qualified(target.attr.type_id, &target.name);
        if self.relationships.iter().any(|r| r.fk.attr == target.attr) {
            return Err(ConfigurationError::DerivedForeignKey(name));
        }

        let mut def = DerivationDef {
            id: RuleId::new(u32::MAX),
            name,
            target,
            kind,
            rule,
        };

        if let Some(existing) = self
            .derivations
            .iter()
            .find(|d| d.target.attr == def.target.attr)
        {
            if existing.same_definition(&def) {
                debug!(target: "rulebank::engine", rule = %existing.id, "{} already declared", existing.describe());
                return Ok(existing.id);
            }
            return Err(ConfigurationError::ConflictingDerivation {
                target: def.name,
                existing: existing.rule.label().to_string(),
                declared: def.rule.label().to_string(),
            });
        }

        def.id = self.allocate_rule_id();
        debug!(target: "rulebank::engine", rule = %def.id, "declared {}", def.describe());
        let id = def.id;
        self.derivations.push(def);
        Ok(id)
    }
}

/// Builder for a type definition.
pub struct TypeBuilder<'a> {
    builder: &'a mut RuleSetBuilder,
    name: String,
    attributes: Vec<AttrDef>,
}

impl<'a> TypeBuilder<'a> {
    /// Add an attribute.
    pub fn attr(mut self, attr: AttrDef) -> Self {
        self.attributes.push(attr);
        self
    }

    /// Finish building this type.
    pub fn done(self) -> ConfigResult<TypeId> {
        if self.builder.type_names.contains_key(&self.name) {
            return Err(ConfigurationError::DuplicateType(self.name));
        }

        let type_id = TypeId::new(self.builder.types.len() as u32);
        let mut attr_ids = Vec::with_capacity(self.attributes.len());
        let mut names: HashMap<String, AttrId> = HashMap::new();
        for attr in self.attributes {
            if names.contains_key(&attr.name) {
                return Err(ConfigurationError::DuplicateAttribute {
                    type_name: self.name,
                    attr: attr.name,
                });
            }
            let attr_id = AttrId::new((self.builder.attrs.len() + attr_ids.len()) as u32);
            names.insert(attr.name.clone(), attr_id);
            attr_ids.push((attr_id, attr));
        }

        let mut attributes = Vec::with_capacity(attr_ids.len());
        for (attr_id, attr) in attr_ids {
            self.builder
                .attr_names
                .insert((type_id, attr.name.clone()), attr_id);
            self.builder.attrs.push(AttrInfo {
                id: attr_id,
                type_id,
                name: attr.name,
                kind: attr.kind,
            });
            attributes.push(attr_id);
        }

        self.builder.type_names.insert(self.name.clone(), type_id);
        self.builder.types.push(TypeDef {
            id: type_id,
            name: self.name,
            attributes,
        });

        Ok(type_id)
    }
}

/// Builder for a relationship definition.
pub struct RelationshipBuilder<'a> {
    builder: &'a mut RuleSetBuilder,
    name: String,
    parent: Option<String>,
    child: Option<String>,
    fk: Option<String>,
}

impl<'a> RelationshipBuilder<'a> {
    /// The "one" side.
    pub fn parent(mut self, type_name: impl Into<String>) -> Self {
        self.parent = Some(type_name.into());
        self
    }

    /// The "many" side.
    pub fn child(mut self, type_name: impl Into<String>) -> Self {
        self.child = Some(type_name.into());
        self
    }

    /// Foreign key attribute on the child.
    pub fn via(mut self, fk_attr: impl Into<String>) -> Self {
        self.fk = Some(fk_attr.into());
        self
    }

    /// Finish building this relationship.
    pub fn done(self) -> ConfigResult<RelationshipId> {
        let b = self.builder;
        if b.relationship_names.contains_key(&self.name) {
            return Err(ConfigurationError::DuplicateRelationship(self.name));
        }

        let parent_name = self
            .parent
            .ok_or_else(|| ConfigurationError::missing_clause(&self.name, "parent"))?;
        let child_name = self
            .child
            .ok_or_else(|| ConfigurationError::missing_clause(&self.name, "child"))?;
        let fk_name = self
            .fk
            .ok_or_else(|| ConfigurationError::missing_clause(&self.name, "via"))?;

        let parent = b.resolve_type(&parent_name)?;
        let child = b.resolve_type(&child_name)?;
        let (fk, kind) = b.resolve_attr(child, &fk_name)?;
        if kind != ValueKind::Ref {
            return Err(ConfigurationError::kind_mismatch(
                b.qualified(child, &fk_name),
                ValueKind::Ref,
                kind,
            ));
        }
        if b.derivations.iter().any(|d| d.target.attr == fk.attr) {
            return Err(ConfigurationError::DerivedForeignKey(
                b.qualified(child, &fk_name),
            ));
        }

        let id = RelationshipId(b.relationships.len() as u32);
        b.relationship_names.insert(self.name.clone(), id);
        b.relationships.push(RelationshipDef {
            id,
            name: self.name,
            parent,
            child,
            fk,
        });
        Ok(id)
    }
}

/// Builder for a constraint definition.
pub struct ConstraintBuilder<'a> {
    builder: &'a mut RuleSetBuilder,
    name: String,
    type_name: Option<String>,
    severity: Severity,
    message: Option<String>,
    predicate: Option<Predicate>,
}

impl<'a> ConstraintBuilder<'a> {
    /// Apply to a type.
    pub fn for_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Message template, with `{row.attr}` and `{old_row.attr}` placeholders.
    pub fn message(mut self, template: impl Into<String>) -> Self {
        self.message = Some(template.into());
        self
    }

    /// Mark as hard constraint (the default).
    pub fn hard(mut self) -> Self {
        self.severity = Severity::Hard;
        self
    }

    /// Mark as soft constraint.
    pub fn soft(mut self) -> Self {
        self.severity = Severity::Soft;
        self
    }

    /// The condition that must hold.
    pub fn check(self, f: impl Fn(&RowState<'_>) -> bool + Send + Sync + 'static) -> Self {
        self.check_with(Predicate::new(f))
    }

    /// The condition that must hold, as a shareable predicate.
    pub fn check_with(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Finish building this constraint.
    pub fn done(self) -> ConfigResult<RuleId> {
        let b = self.builder;
        let type_name = self
            .type_name
            .ok_or_else(|| ConfigurationError::missing_clause(&self.name, "for_type"))?;
        let predicate = self
            .predicate
            .ok_or_else(|| ConfigurationError::missing_clause(&self.name, "check"))?;
        let type_id = b.resolve_type(&type_name)?;
        let message = self
            .message
            .unwrap_or_else(|| format!("{} violated", self.name));

        let def = ConstraintDef {
            id: RuleId::new(u32::MAX),
            name: self.name,
            type_id,
            severity: self.severity,
            message,
            predicate,
        };

        if let Some(existing) = b.constraints.iter().find(|c| c.name == def.name) {
            if existing.same_definition(&def) {
                return Ok(existing.id);
            }
            return Err(ConfigurationError::ConflictingConstraint(def.name));
        }

        let id = b.allocate_rule_id();
        debug!(target: "rulebank::engine", rule = %id, "declared constraint {}", def.name);
        b.constraints.push(ConstraintDef { id, ..def });
        Ok(id)
    }
}

/// Clauses shared by sum and count declarations.
struct AggregateSpec {
    type_name: String,
    attr: String,
    child: Option<String>,
    via: Option<String>,
    filter: Option<(Vec<String>, RowFilter)>,
}

enum AggregateOp {
    Sum(Option<String>),
    Count,
}

impl AggregateSpec {
    fn new(type_name: String, attr: String) -> Self {
        Self {
            type_name,
            attr,
            child: None,
            via: None,
            filter: None,
        }
    }

    fn finish(self, b: &mut RuleSetBuilder, op: AggregateOp) -> ConfigResult<RuleId> {
        let declaration = format!("{}.{}", self.type_name, self.attr);
        let parent = b.resolve_type(&self.type_name)?;
        let (target, target_kind) = b.resolve_attr(parent, &self.attr)?;
        let child_name = self
            .child
            .ok_or_else(|| ConfigurationError::missing_clause(&declaration, "of"))?;
        let child = b.resolve_type(&child_name)?;
        let rel = b.resolve_relationship(parent, child, self.via.as_deref())?;

        let source = match &op {
            AggregateOp::Sum(source) => {
                let source_name = source
                    .as_deref()
                    .ok_or_else(|| ConfigurationError::missing_clause(&declaration, "of"))?;
                if !target_kind.is_numeric() {
                    return Err(ConfigurationError::kind_mismatch(
                        &declaration,
                        "Int or Float",
                        target_kind,
                    ));
                }
                let (source, source_kind) = b.resolve_attr(child, source_name)?;
                if source_kind != target_kind {
                    return Err(ConfigurationError::kind_mismatch(
                        b.qualified(child, source_name),
                        target_kind,
                        source_kind,
                    ));
                }
                Some(source)
            }
            AggregateOp::Count => {
                if target_kind != ValueKind::Int {
                    return Err(ConfigurationError::kind_mismatch(
                        &declaration,
                        ValueKind::Int,
                        target_kind,
                    ));
                }
                None
            }
        };

        let filter = match self.filter {
            Some((names, filter)) => {
                let attrs = names
                    .iter()
                    .map(|name| b.resolve_attr(child, name).map(|(bound, _)| bound))
                    .collect::<ConfigResult<Vec<_>>>()?;
                Some(AggregateFilter { attrs, filter })
            }
            None => None,
        };

        let agg = AggregateDef {
            relationship: rel.id,
            child_type: child,
            fk: rel.fk,
            source,
            filter,
        };
        let rule = match op {
            AggregateOp::Sum(_) => DerivationKind::Sum(agg),
            AggregateOp::Count => DerivationKind::Count(agg),
        };
        b.register_derivation(target, target_kind, rule)
    }
}

/// Builder for a sum derivation.
pub struct SumBuilder<'a> {
    builder: &'a mut RuleSetBuilder,
    spec: AggregateSpec,
    source: Option<String>,
}

impl<'a> SumBuilder<'a> {
    /// The child type and the child attribute to sum.
    pub fn of(mut self, child_type: impl Into<String>, source_attr: impl Into<String>) -> Self {
        self.spec.child = Some(child_type.into());
        self.source = Some(source_attr.into());
        self
    }

    /// Name the relationship when several connect the two types.
    pub fn via(mut self, relationship: impl Into<String>) -> Self {
        self.spec.via = Some(relationship.into());
        self
    }

    /// Only sum children for which `f` holds. `attrs` are the child
    /// attributes `f` reads.
    pub fn where_(self, attrs: &[&str], f: impl Fn(&Row) -> bool + Send + Sync + 'static) -> Self {
        self.where_filter(attrs, RowFilter::new(f))
    }

    /// Like `where_`, with a shareable filter.
    pub fn where_filter(mut self, attrs: &[&str], filter: RowFilter) -> Self {
        let names = attrs.iter().map(|a| a.to_string()).collect();
        self.spec.filter = Some((names, filter));
        self
    }

    /// Finish building this derivation.
    pub fn done(self) -> ConfigResult<RuleId> {
        self.spec.finish(self.builder, AggregateOp::Sum(self.source))
    }
}

/// Builder for a count derivation.
pub struct CountBuilder<'a> {
    builder: &'a mut RuleSetBuilder,
    spec: AggregateSpec,
}

impl<'a> CountBuilder<'a> {
    /// The child type to count.
    pub fn of(mut self, child_type: impl Into<String>) -> Self {
        self.spec.child = Some(child_type.into());
        self
    }

    /// Name the relationship when several connect the two types.
    pub fn via(mut self, relationship: impl Into<String>) -> Self {
        self.spec.via = Some(relationship.into());
        self
    }

    /// Only count children for which `f` holds. `attrs` are the child
    /// attributes `f` reads.
    pub fn where_(self, attrs: &[&str], f: impl Fn(&Row) -> bool + Send + Sync + 'static) -> Self {
        self.where_filter(attrs, RowFilter::new(f))
    }

    /// Like `where_`, with a shareable filter.
    pub fn where_filter(mut self, attrs: &[&str], filter: RowFilter) -> Self {
        let names = attrs.iter().map(|a| a.to_string()).collect();
        self.spec.filter = Some((names, filter));
        self
    }

    /// Finish building this derivation.
    pub fn done(self) -> ConfigResult<RuleId> {
        self.spec.finish(self.builder, AggregateOp::Count)
    }
}

/// Builder for a formula derivation.
pub struct FormulaBuilder<'a> {
    builder: &'a mut RuleSetBuilder,
    type_name: String,
    attr: String,
    own: Vec<String>,
    parents: Vec<(String, String)>,
    formula: Option<Formula>,
}

impl<'a> FormulaBuilder<'a> {
    /// Own attributes the formula reads.
    pub fn depends_on(mut self, attrs: &[&str]) -> Self {
        self.own.extend(attrs.iter().map(|a| a.to_string()));
        self
    }

    /// A parent attribute the formula reads through `relationship`.
    pub fn depends_on_parent(
        mut self,
        relationship: impl Into<String>,
        attr: impl Into<String>,
    ) -> Self {
        self.parents.push((relationship.into(), attr.into()));
        self
    }

    /// The formula.
    pub fn compute(
        self,
        f: impl Fn(&FormulaContext<'_>) -> Result<Value, FormulaError> + Send + Sync + 'static,
    ) -> Self {
        self.compute_with(Formula::new(f))
    }

    /// The formula, as a shareable callable.
    pub fn compute_with(mut self, formula: Formula) -> Self {
        self.formula = Some(formula);
        self
    }

    /// Finish building this derivation.
    pub fn done(self) -> ConfigResult<RuleId> {
        let b = self.builder;
        let declaration = format!("{}.{}", self.type_name, self.attr);
        let type_id = b.resolve_type(&self.type_name)?;
        let (target, kind) = b.resolve_attr(type_id, &self.attr)?;
        let formula = self
            .formula
            .ok_or_else(|| ConfigurationError::missing_clause(&declaration, "compute"))?;

        let own = self
            .own
            .iter()
            .map(|name| b.resolve_attr(type_id, name).map(|(bound, _)| bound))
            .collect::<ConfigResult<Vec<_>>>()?;

        let mut parents = Vec::with_capacity(self.parents.len());
        for (rel_name, attr_name) in &self.parents {
            let rel = b
                .relationship_names
                .get(rel_name)
                .and_then(|id| b.relationships.get(id.0 as usize))
                .cloned()
                .ok_or_else(|| ConfigurationError::UnknownRelationship(rel_name.clone()))?;
            if rel.child != type_id {
                return Err(ConfigurationError::NoRelationship {
                    parent: b.type_name(rel.parent).to_string(),
                    child: self.type_name.clone(),
                });
            }
            let (attr, _) = b.resolve_attr(rel.parent, attr_name)?;
            parents.push(ParentDependency {
                relationship: rel.id,
                relationship_name: rel.name,
                fk: rel.fk,
                attr,
            });
        }

        b.register_derivation(
            target,
            kind,
            DerivationKind::Formula(FormulaDef {
                own,
                parents,
                formula,
            }),
        )
    }
}
