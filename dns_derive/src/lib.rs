// Proc-macro support for wire (de)serialization of DNS structures.
//
// Only struct derivation survives from the original macro pair: every
// wire-facing enum in this crate (ResourceType, OpCode, ResponseCode...)
// must tolerate unknown numeric values per RFC 1035 and RFC 6762, so a
// closed, panic-on-unknown-variant derive (the old DnsEnum) no longer fits
// and was dropped. See DESIGN.md.
use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod dns_struct;
use dns_struct::dns_derive;

#[proc_macro_derive(DnsStruct)]
pub fn dns_struct(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    dns_derive(&ast)
}
