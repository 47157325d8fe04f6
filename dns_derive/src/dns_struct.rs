// Derives ToFromNetworkOrder for a struct by chaining calls to each field's
// own impl, in declaration order. This is exactly RFC 1035's "emit/read the
// fixed fields in order" shape, so no field ever needs special-casing here;
// types whose wire layout depends on another field (Record's rdata, Message's
// header-driven section counts) implement the trait by hand instead of
// deriving it.
use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DataStruct, DeriveInput};

fn get_struct(ast: &DeriveInput) -> &DataStruct {
    if let Data::Struct(struct_token) = &ast.data {
        struct_token
    } else {
        panic!("<{}> is not a struct!", ast.ident.to_string());
    }
}

pub fn dns_derive(ast: &DeriveInput) -> TokenStream {
    let struct_token = get_struct(ast);
    let structure_name = &ast.ident;

    let to_method_calls = struct_token.fields.iter().map(|f| {
        let field_name = f.ident.as_ref().unwrap();
        quote! {
            length += ToFromNetworkOrder::to_network_bytes(&self.#field_name, buffer)?;
        }
    });

    let from_method_calls = struct_token.fields.iter().map(|f| {
        let field_name = f.ident.as_ref().unwrap();
        quote! {
            ToFromNetworkOrder::from_network_bytes(&mut self.#field_name, buffer)?;
        }
    });

    let new_code = quote! {
        impl ToFromNetworkOrder for #structure_name {
            fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
                let mut length = 0usize;
                #( #to_method_calls)*
                Ok(length)
            }

            fn from_network_bytes(&mut self, buffer: &mut std::io::Cursor<&[u8]>) -> DnsResult<()> {
                #( #from_method_calls)*
                Ok(())
            }
        }
    };

    TokenStream::from(new_code)
}
