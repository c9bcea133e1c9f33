//! Wire tags for the query language.
//!
//! [`TermType`] is the closed enumeration of language operators; its `i32`
//! discriminants are the authoritative wire tags used by both the JSON
//! envelope (`[tag, args, optargs]`) and the binary term codecs. Tags are
//! stable forever: new operators take fresh numbers, retired numbers are
//! never reused.

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident : $repr:ident {
            $($(#[$vmeta:meta])* $variant:ident = $tag:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr($repr)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $tag,)*
        }

        impl $name {
            /// Decode a wire tag; `None` for tags outside the enumeration.
            pub fn from_wire(tag: $repr) -> Option<Self> {
                match tag {
                    $($tag => Some($name::$variant),)*
                    _ => None,
                }
            }

            /// The wire tag of this value.
            pub fn wire_tag(self) -> $repr {
                self as $repr
            }
        }
    };
}

wire_enum! {
    /// Operator tags of the query language.
    ///
    /// `Datum` is special: it marks a leaf carrying an immutable value rather
    /// than an operator application.
    TermType: i32 {
        Datum = 1,
        MakeArray = 2,
        MakeObj = 3,
        Var = 10,
        Error = 12,
        ImplicitVar = 13,
        Db = 14,
        Table = 15,
        Get = 16,
        Eq = 17,
        Ne = 18,
        Lt = 19,
        Le = 20,
        Gt = 21,
        Ge = 22,
        Not = 23,
        Add = 24,
        Sub = 25,
        Mul = 26,
        Div = 27,
        Mod = 28,
        Append = 29,
        Slice = 30,
        GetField = 31,
        HasFields = 32,
        Pluck = 33,
        Without = 34,
        Merge = 35,
        Reduce = 37,
        Map = 38,
        Filter = 39,
        ConcatMap = 40,
        OrderBy = 41,
        Distinct = 42,
        Count = 43,
        Union = 44,
        Nth = 45,
        InnerJoin = 48,
        OuterJoin = 49,
        EqJoin = 50,
        CoerceTo = 51,
        TypeOf = 52,
        Update = 53,
        Delete = 54,
        Replace = 55,
        Insert = 56,
        DbCreate = 57,
        DbDrop = 58,
        DbList = 59,
        TableCreate = 60,
        TableDrop = 61,
        TableList = 62,
        Funcall = 64,
        Branch = 65,
        Or = 66,
        And = 67,
        ForEach = 68,
        Func = 69,
        Skip = 70,
        Limit = 71,
        Zip = 72,
        Asc = 73,
        Desc = 74,
        Contains = 77,
        GetAll = 78,
        Default = 92,
        Now = 103,
    }
}

wire_enum! {
    /// Operation type of a query envelope.
    QueryType: i32 {
        Start = 1,
        Continue = 2,
        Stop = 3,
        NoreplyWait = 4,
        ServerInfo = 5,
    }
}

wire_enum! {
    /// Error response codes returned to clients.
    ResponseType: i32 {
        ClientError = 16,
        CompileError = 17,
        RuntimeError = 18,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_type_round_trip() {
        for t in [
            TermType::Datum,
            TermType::MakeObj,
            TermType::Func,
            TermType::Now,
            TermType::Db,
        ] {
            assert_eq!(TermType::from_wire(t.wire_tag()), Some(t));
        }
        assert_eq!(TermType::from_wire(0), None);
        assert_eq!(TermType::from_wire(-1), None);
        assert_eq!(TermType::from_wire(9999), None);
    }

    #[test]
    fn test_query_type_tags() {
        assert_eq!(QueryType::from_wire(1), Some(QueryType::Start));
        assert_eq!(QueryType::from_wire(4), Some(QueryType::NoreplyWait));
        assert_eq!(QueryType::from_wire(6), None);
    }
}
