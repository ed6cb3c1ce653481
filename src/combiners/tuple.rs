//! Tuples of combiners fold every member over the same values in one pass.

use crate::combiners::CombineFn;

macro_rules! tuple_combine {
    ($(($C:ident, $A:ident, $O:ident, $idx:tt)),+) => {
        impl<V, $($C, $A, $O),+> CombineFn<V, ($($A,)+), ($($O,)+)> for ($($C,)+)
        where
            V: Clone + 'static,
            $($C: CombineFn<V, $A, $O>,)+
        {
            fn create(&self) -> ($($A,)+) {
                ($(self.$idx.create(),)+)
            }

            fn add_input(&self, acc: &mut ($($A,)+), v: V) {
                $(self.$idx.add_input(&mut acc.$idx, v.clone());)+
            }

            fn merge(&self, acc: &mut ($($A,)+), other: ($($A,)+)) {
                $(self.$idx.merge(&mut acc.$idx, other.$idx);)+
            }

            fn finish(&self, acc: ($($A,)+)) -> ($($O,)+) {
                ($(self.$idx.finish(acc.$idx),)+)
            }
        }
    };
}

tuple_combine!((C0, A0, O0, 0));
tuple_combine!((C0, A0, O0, 0), (C1, A1, O1, 1));
tuple_combine!((C0, A0, O0, 0), (C1, A1, O1, 1), (C2, A2, O2, 2));
tuple_combine!((C0, A0, O0, 0), (C1, A1, O1, 1), (C2, A2, O2, 2), (C3, A3, O3, 3));
tuple_combine!(
    (C0, A0, O0, 0),
    (C1, A1, O1, 1),
    (C2, A2, O2, 2),
    (C3, A3, O3, 3),
    (C4, A4, O4, 4)
);
tuple_combine!(
    (C0, A0, O0, 0),
    (C1, A1, O1, 1),
    (C2, A2, O2, 2),
    (C3, A3, O3, 3),
    (C4, A4, O4, 4),
    (C5, A5, O5, 5)
);
tuple_combine!(
    (C0, A0, O0, 0),
    (C1, A1, O1, 1),
    (C2, A2, O2, 2),
    (C3, A3, O3, 3),
    (C4, A4, O4, 4),
    (C5, A5, O5, 5),
    (C6, A6, O6, 6)
);
tuple_combine!(
    (C0, A0, O0, 0),
    (C1, A1, O1, 1),
    (C2, A2, O2, 2),
    (C3, A3, O3, 3),
    (C4, A4, O4, 4),
    (C5, A5, O5, 5),
    (C6, A6, O6, 6),
    (C7, A7, O7, 7)
);
