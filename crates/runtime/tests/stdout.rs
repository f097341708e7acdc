mod stdout {
    use sprig_test_utils::check_session;

    fn check_output(snippets: &[(&str, Option<&str>)], expected_output: &str) {
        let (_, output) = check_session(snippets);
        assert_eq!(*output.captured_output(), expected_output);
    }

    #[test]
    fn println() {
        check_output(
            &[("import sprig/io;", None), ("io:println(\"hello\");", None)],
            "hello\n",
        );
    }

    #[test]
    fn print_joins_values_without_separators() {
        check_output(
            &[
                ("import sprig/io;", None),
                ("io:print(\"a\", 1, 2.5, true);", None),
                ("io:println();", None),
            ],
            "a12.5true\n",
        );
    }

    #[test]
    fn output_from_functions() {
        let function = "\
function countdown(int n) {
    while n > 0 {
        io:println(n);
        n -= 1;
    }
    io:println(\"liftoff\");
}";
        check_output(
            &[
                ("import sprig/io;", None),
                (function, None),
                ("countdown(3);", None),
            ],
            "3\n2\n1\nliftoff\n",
        );
    }

    #[test]
    fn lists_are_rendered_with_quoted_strings() {
        check_output(
            &[
                ("import sprig/io;", None),
                ("io:println([\"x\", nil, [1]]);", None),
            ],
            "[\"x\", nil, [1]]\n",
        );
    }

    #[test]
    fn output_isnt_repeated_by_later_snippets() {
        check_output(
            &[
                ("import sprig/io;", None),
                ("int greeted = 0;", None),
                ("io:println(\"once\");", None),
                ("greeted += 1;", None),
            ],
            "once\n",
        );
    }
}
