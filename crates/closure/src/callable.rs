/// A callable that can be stored in a [`TaskClosure`](crate::TaskClosure).
///
/// `Args` is the argument list as a tuple: `()` for nullary callables,
/// `(A0,)` for one argument, up to eight arguments. Every
/// `FnMut(A0, .., An) -> R + Send + 'static` implements this trait, so plain
/// closures and function items can be stored without wrapping.
///
/// Closure parameter types are not inferred through this trait; annotate
/// them (`|n: u32| n + 1`) when constructing a closure with arguments.
pub trait Callable<Args, R>: Send + 'static {
    fn call(&mut self, args: Args) -> R;
}

macro_rules! impl_callable {
    ($($arg:ident: $ty:ident),*) => {
        impl<Func, Ret, $($ty,)*> Callable<($($ty,)*), Ret> for Func
        where
            Func: FnMut($($ty),*) -> Ret + Send + 'static,
        {
            #[inline]
            fn call(&mut self, ($($arg,)*): ($($ty,)*)) -> Ret {
                (*self)($($arg),*)
            }
        }
    };
}

impl_callable!();
impl_callable!(a0: A0);
impl_callable!(a0: A0, a1: A1);
impl_callable!(a0: A0, a1: A1, a2: A2);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7);
