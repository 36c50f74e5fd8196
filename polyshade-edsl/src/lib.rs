//! Derive sugar for [polyshade](https://crates.io/crates/polyshade).
//!
//! `#[derive(ShaderStruct)]` maps a Rust struct with named fields to a shader struct type, by implementing
//! `polyshade::types::ToType`. Every field must itself implement `ToType`.
//!
//! The struct can be annotated with `#[shader(...)]`:
//!
//! - `std140` or `packed` selects the memory layout; structs are packed by default.
//! - `name = "Name"` overrides the name the struct is declared with; the Rust name is used by default.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{
  ext::IdentExt, parse_macro_input, spanned::Spanned, Data, DeriveInput, Error, Fields, Lit, Meta, NestedMeta,
};

#[proc_macro_derive(ShaderStruct, attributes(shader))]
pub fn derive_shader_struct(input: TokenStream) -> TokenStream {
  let input = parse_macro_input!(input as DeriveInput);

  match expand(input) {
    Ok(tokens) => tokens.into(),
    Err(err) => err.to_compile_error().into(),
  }
}

#[derive(Debug)]
struct StructAttrs {
  std140: bool,
  name: Option<String>,
}

fn parse_attrs(input: &DeriveInput) -> Result<StructAttrs, Error> {
  let mut attrs = StructAttrs {
    std140: false,
    name: None,
  };

  for attr in input.attrs.iter().filter(|a| a.path.is_ident("shader")) {
    let list = match attr.parse_meta()? {
      Meta::List(list) => list,
      meta => return Err(Error::new(meta.span(), "expected #[shader(...)]")),
    };

    for nested in list.nested {
      match nested {
        NestedMeta::Meta(Meta::Path(path)) if path.is_ident("std140") => attrs.std140 = true,
        NestedMeta::Meta(Meta::Path(path)) if path.is_ident("packed") => attrs.std140 = false,

        NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("name") => match nv.lit {
          Lit::Str(s) => attrs.name = Some(s.value()),
          lit => return Err(Error::new(lit.span(), "the struct name must be a string")),
        },

        other => {
          return Err(Error::new(
            other.span(),
            "unknown shader attribute; expected std140, packed or name = \"...\"",
          ))
        }
      }
    }
  }

  Ok(attrs)
}

fn expand(input: DeriveInput) -> Result<proc_macro2::TokenStream, Error> {
  let attrs = parse_attrs(&input)?;

  let fields = match &input.data {
    Data::Struct(s) => match &s.fields {
      Fields::Named(named) => &named.named,
      _ => {
        return Err(Error::new(
          input.ident.span(),
          "ShaderStruct requires a struct with named fields",
        ))
      }
    },

    _ => return Err(Error::new(Span::call_site(), "ShaderStruct can only be derived on structs")),
  };

  if fields.is_empty() {
    return Err(Error::new(input.ident.span(), "shader structs must have at least one field"));
  }

  let ident = &input.ident;
  let name = attrs.name.unwrap_or_else(|| ident.unraw().to_string());
  let layout = if attrs.std140 {
    quote! { ::polyshade::types::LayoutPolicy::Std140 }
  } else {
    quote! { ::polyshade::types::LayoutPolicy::Packed }
  };

  let members = fields.iter().map(|field| {
    // named fields always have an ident
    let field_name = field.ident.as_ref().map(|i| i.unraw().to_string()).unwrap_or_default();
    let ty = &field.ty;

    quote! {
      (#field_name.to_owned(), <#ty as ::polyshade::types::ToType>::ty())
    }
  });

  let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

  Ok(quote! {
    impl #impl_generics ::polyshade::types::ToType for #ident #ty_generics #where_clause {
      fn ty() -> ::polyshade::types::TypeDesc {
        ::polyshade::types::TypeDesc::Struct(::polyshade::types::StructDesc {
          name: ::std::option::Option::Some(#name.to_owned()),
          layout: #layout,
          members: ::std::vec![#(#members),*],
        })
      }
    }
  })
}
