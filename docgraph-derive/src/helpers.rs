//! Helper functions for implementing procedural macros.

use itertools::Itertools;
use proc_macro2::TokenStream;
use std::borrow::Borrow;
use syn::{
    parenthesized,
    parse::{Parse, Parser},
    Attribute, Expr, Ident, Lit, Meta,
};

/// Convenient parsing interface for helper attributes.
///
/// A single attribute may carry several comma-separated items, as in
/// `#[scope(unique, rename(emailAddress))]`; each item is considered separately.
pub struct AttrParser(String);

impl AttrParser {
    /// Create a new parser for attributes in `scope`, the top-level identifier of attributes parsed
    /// by this parser.
    ///
    /// This parser will parse any attribute of the form `#[scope(name)]` (boolean attributes) or
    /// `#[scope(name(arg))]` (argument attributes).
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    /// Check if a list of attributes has a certain boolean attribute.
    ///
    /// # Panics
    ///
    /// Panics if `attrs` has an attribute in this scope which is malformed (e.g. it's name is
    /// `self.scope()` but its meta attribute does not start with an identifier).
    pub fn has_bool<I>(&self, attrs: I, name: &str) -> bool
    where
        I: IntoIterator,
        I::Item: Borrow<Attribute>,
    {
        attrs.into_iter().any(|a| {
            self.parse_attr(a.borrow())
                .into_iter()
                .any(|(attr_name, param)| attr_name == name && param.is_none())
        })
    }

    /// Check if a list of attributes has a certain attribute and return its argument.
    ///
    /// # Panics
    ///
    /// Panics if `attrs` has an attribute in this scope which is malformed (e.g. it's name is
    /// `self.scope()` but its meta attribute does not start with an identifier) or if the attribute
    /// exists but its argument does not parse as a `T`.
    pub fn get_arg<T: Parse, I>(&self, attrs: I, name: &str) -> Option<T>
    where
        I: IntoIterator,
        I::Item: Borrow<Attribute>,
    {
        attrs
            .into_iter()
            .find_map(|a| self.parse_arg_with(a.borrow(), name, T::parse))
    }

    /// Check if `a` contains a certain attribute and return its argument.
    ///
    /// If `a` is a valid attribute in this scope with an item named `name` taking one parameter,
    /// this function parses and returns the parameter. Otherwise it returns [`None`].
    ///
    /// # Panics
    ///
    /// Panics if `a` is in scope but malformed or if the attribute argument does not parse using
    /// `p`.
    pub fn parse_arg_with<P: Parser>(
        &self,
        a: &Attribute,
        name: &str,
        p: P,
    ) -> Option<P::Output> {
        self.parse_attr(a)
            .into_iter()
            .find_map(|(attr_name, param)| match param {
                Some(param) if attr_name == name => Some(param),
                _ => None,
            })
            .map(|param| {
                p.parse2(param).unwrap_or_else(|_| {
                    panic!(
                        "argument to {} must be a {}",
                        name,
                        std::any::type_name::<P::Output>(),
                    )
                })
            })
    }

    /// Parse an attribute in this scope, returning the name and parameter of each item.
    ///
    /// For example, parsing the attribute `#[scope(foo(bar), baz)]` would result in
    /// `[("foo", Some("bar")), ("baz", None)]`. If `a` is not in scope, the result is empty.
    ///
    /// # Panics
    ///
    /// Panics if `a` is in scope but malformed (e.g. it's name is `self.scope()` but its meta
    /// attribute does not start with an identifier).
    pub fn parse_attr(&self, a: &Attribute) -> Vec<(Ident, Option<TokenStream>)> {
        let mut parsed = vec![];
        if a.path().is_ident(&self.0) {
            a.parse_nested_meta(|meta| {
                let name = meta.path.get_ident().unwrap_or_else(|| {
                    panic!("{} attribute must start with an identifier", self.0)
                });
                let content = if meta.input.is_empty() || meta.input.peek(syn::Token![,]) {
                    None
                } else {
                    let content;
                    parenthesized!(content in meta.input);
                    Some(content.parse()?)
                };
                parsed.push((name.clone(), content));
                Ok(())
            })
            .unwrap_or_else(|err| panic!("malformed {} attribute: {err}", self.0));
        }
        parsed
    }

    /// Check that every item of every attribute in this scope is one of `known`.
    ///
    /// # Panics
    ///
    /// Panics on the first unknown item, so that typos are not silently ignored.
    pub fn check_known<I>(&self, attrs: I, known: &[&str])
    where
        I: IntoIterator,
        I::Item: Borrow<Attribute>,
    {
        for a in attrs {
            for (name, _) in self.parse_attr(a.borrow()) {
                if !known.iter().any(|k| name == k) {
                    panic!(
                        "unknown {} attribute {name} (expected one of {})",
                        self.0,
                        known.iter().join(", ")
                    );
                }
            }
        }
    }
}

/// Extract documentation from the attributes on an item.
///
/// The documentation is constructed by taking all the `#[doc = "..."]` attributes and concatenating
/// their arguments, separated by newlines.
pub fn parse_docs(attrs: &[Attribute]) -> String {
    attrs
        .iter()
        .filter_map(|attr| {
            let Meta::NameValue(nv) = &attr.meta else { return None; };
            if !nv.path.is_ident("doc") {
                return None;
            }
            let Expr::Lit(lit) = &nv.value else { return None; };
            let Lit::Str(s) = &lit.lit else { return None; };
            Some(s.value().trim().to_string())
        })
        .join("\n")
}
