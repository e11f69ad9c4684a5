//! The RuleSet - immutable rule and schema lookup.

use std::collections::HashMap;

use rulebank_core::{AttrId, AttrRef, RuleId, TypeId};

use crate::{
    AttrInfo, ConfigResult, ConfigurationError, ConstraintDef, DerivationDef, RelationshipDef,
    RelationshipId, TypeDef,
};

/// The declared rules of one activation.
/// It is immutable after construction; use `RuleSetBuilder` to create one.
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// Type definitions, indexed by TypeId.
    types: Vec<TypeDef>,
    /// Type ID lookup by name.
    type_names: HashMap<String, TypeId>,

    /// Attributes, indexed by AttrId.
    attrs: Vec<AttrInfo>,
    /// Attribute ID lookup by owner type and name.
    attr_names: HashMap<(TypeId, String), AttrId>,

    /// Relationships, indexed by RelationshipId.
    relationships: Vec<RelationshipDef>,
    /// Relationship ID lookup by name.
    relationship_names: HashMap<String, RelationshipId>,

    /// Constraint definitions in declaration order.
    constraints: Vec<ConstraintDef>,
    /// Constraints indexed by type ID.
    constraints_by_type: HashMap<TypeId, Vec<usize>>,

    /// Derivation definitions in declaration order.
    derivations: Vec<DerivationDef>,
    /// Derivations indexed by target attribute.
    derivation_by_target: HashMap<AttrRef, usize>,
    /// Derivations indexed by rule ID.
    derivation_by_id: HashMap<RuleId, usize>,
}

impl RuleSet {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        types: Vec<TypeDef>,
        type_names: HashMap<String, TypeId>,
        attrs: Vec<AttrInfo>,
        attr_names: HashMap<(TypeId, String), AttrId>,
        relationships: Vec<RelationshipDef>,
        relationship_names: HashMap<String, RelationshipId>,
        constraints: Vec<ConstraintDef>,
        derivations: Vec<DerivationDef>,
    ) -> Self {
        let mut constraints_by_type: HashMap<TypeId, Vec<usize>> = HashMap::new();
        for (i, constraint) in constraints.iter().enumerate() {
            constraints_by_type
                .entry(constraint.type_id)
                .or_default()
                .push(i);
        }

        let derivation_by_target = derivations
            .iter()
            .enumerate()
            .map(|(i, d)| (d.target.attr, i))
            .collect();
        let derivation_by_id = derivations
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id, i))
            .collect();

        Self {
            types,
            type_names,
            attrs,
            attr_names,
            relationships,
            relationship_names,
            constraints,
            constraints_by_type,
            derivations,
            derivation_by_target,
            derivation_by_id,
        }
    }

    // ==================== Type Lookups ====================

    /// Get a type definition by ID.
    pub fn get_type(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.get(id.raw() as usize)
    }

    /// Get a type definition by name.
    pub fn get_type_by_name(&self, name: &str) -> Option<&TypeDef> {
        self.type_id(name).and_then(|id| self.get_type(id))
    }

    /// Get a type ID by name.
    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    /// Name of a type, `?` for unknown ids.
    pub fn type_name(&self, id: TypeId) -> &str {
        self.get_type(id).map_or("?", |t| t.name.as_str())
    }

    /// Get all type definitions.
    pub fn all_types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.iter()
    }

    // ==================== Attribute Lookups ====================

    /// Get an attribute by ID.
    pub fn attr(&self, id: AttrId) -> Option<&AttrInfo> {
        self.attrs.get(id.raw() as usize)
    }

    /// Get an attribute by its stable reference.
    pub fn attr_info(&self, attr: AttrRef) -> Option<&AttrInfo> {
        self.attr(attr.attr_id).filter(|a| a.type_id == attr.type_id)
    }

    /// Get an attribute ID by owner type and name.
    pub fn attr_id(&self, type_id: TypeId, name: &str) -> Option<AttrId> {
        self.attr_names.get(&(type_id, name.to_string())).copied()
    }

    /// Get an attribute by owner type and name.
    pub fn attr_by_name(&self, type_id: TypeId, name: &str) -> Option<&AttrInfo> {
        self.attr_id(type_id, name).and_then(|id| self.attr(id))
    }

    /// Stable reference of `type_name.attr`.
    pub fn attr_ref(&self, type_name: &str, attr: &str) -> Option<AttrRef> {
        let type_id = self.type_id(type_name)?;
        self.attr_by_name(type_id, attr).map(AttrInfo::attr_ref)
    }

    /// Attributes of a type in declaration order.
    pub fn attrs_of(&self, type_id: TypeId) -> impl Iterator<Item = &AttrInfo> {
        self.get_type(type_id)
            .into_iter()
            .flat_map(|t| t.attributes.iter())
            .filter_map(|id| self.attr(*id))
    }

    /// Qualified attribute name, e.g. `Order.amount_owed`.
    pub fn qualified_name(&self, attr: AttrRef) -> String {
        match self.attr_info(attr) {
            Some(info) => format!("{}.{}", self.type_name(info.type_id), info.name),
            None => attr.to_string(),
        }
    }

    // ==================== Relationship Lookups ====================

    /// Get a relationship by ID.
    pub fn relationship(&self, id: RelationshipId) -> Option<&RelationshipDef> {
        self.relationships.get(id.0 as usize)
    }

    /// Get a relationship by name.
    pub fn relationship_by_name(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationship_names
            .get(name)
            .and_then(|id| self.relationship(*id))
    }

    /// Get all relationships.
    pub fn relationships(&self) -> &[RelationshipDef] {
        &self.relationships
    }

    /// Relationships in which `type_id` is the child.
    pub fn relationships_as_child(&self, type_id: TypeId) -> impl Iterator<Item = &RelationshipDef> {
        self.relationships.iter().filter(move |r| r.child == type_id)
    }

    /// Returns true if the attribute is the foreign key of a relationship.
    pub fn is_foreign_key(&self, attr: AttrRef) -> bool {
        self.relationships.iter().any(|r| r.fk.attr == attr)
    }

    // ==================== Constraint Lookups ====================

    /// Get all constraints in declaration order.
    pub fn constraints(&self) -> &[ConstraintDef] {
        &self.constraints
    }

    /// Get constraints declared for a type.
    pub fn constraints_for_type(&self, type_id: TypeId) -> Vec<&ConstraintDef> {
        self.constraints_by_type
            .get(&type_id)
            .map(|indices| indices.iter().map(|&i| &self.constraints[i]).collect())
            .unwrap_or_default()
    }

    // ==================== Derivation Lookups ====================

    /// Get all derivations in declaration order.
    pub fn derivations(&self) -> &[DerivationDef] {
        &self.derivations
    }

    /// Get a derivation by rule ID.
    pub fn derivation(&self, id: RuleId) -> Option<&DerivationDef> {
        self.derivation_by_id
            .get(&id)
            .map(|&i| &self.derivations[i])
    }

    /// Position of a derivation in declaration order.
    pub fn declaration_index(&self, id: RuleId) -> Option<usize> {
        self.derivation_by_id.get(&id).copied()
    }

    /// Get the derivation producing an attribute.
    pub fn derivation_for(&self, attr: AttrRef) -> Option<&DerivationDef> {
        self.derivation_by_target
            .get(&attr)
            .map(|&i| &self.derivations[i])
    }

    /// Get the derivations whose target belongs to a type.
    pub fn derivations_for_type(&self, type_id: TypeId) -> Vec<&DerivationDef> {
        self.derivations
            .iter()
            .filter(|d| d.target.attr.type_id == type_id)
            .collect()
    }

    /// Returns true if the attribute is computed by a rule.
    pub fn is_derived(&self, attr: AttrRef) -> bool {
        self.derivation_by_target.contains_key(&attr)
    }

    /// Number of declared rules of both kinds.
    pub fn rule_count(&self) -> usize {
        self.derivations.len() + self.constraints.len()
    }

    // ==================== Redeclaration ====================

    /// Check that `next` can replace this rule set over the same stored rows.
    ///
    /// Rows are stored under their TypeId and hold attributes by name, so
    /// every type must keep its id and every attribute still declared must
    /// keep its kind. New types and attributes may be added; attributes may
    /// be dropped.
    pub fn check_redeclaration(&self, next: &RuleSet) -> ConfigResult<()> {
        for ty in self.all_types() {
            let next_id = next
                .type_id(&ty.name)
                .ok_or_else(|| ConfigurationError::incompatible("type", format!("{} removed", ty.name)))?;
            if next_id != ty.id {
                return Err(ConfigurationError::incompatible(
                    "type",
                    format!("{} moves from {} to {}", ty.name, ty.id, next_id),
                ));
            }

            for attr in self.attrs_of(ty.id) {
                match next.attr_by_name(next_id, &attr.name) {
                    Some(info) if info.kind != attr.kind => {
                        return Err(ConfigurationError::incompatible(
                            "attribute",
                            format!("{}.{} changes from {} to {}", ty.name, attr.name, attr.kind, info.kind),
                        ))
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}
